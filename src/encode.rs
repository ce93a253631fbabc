//! Image transport encoding: payload → base64 data URI.
//!
//! OpenAI-compatible servers accept images as base64 data URIs embedded in
//! the JSON request body. In-memory images are encoded as PNG — lossless,
//! so rendered text stays crisp; JPEG artefacts on document crops measurably
//! hurt transcription accuracy. Raw byte payloads are passed through
//! unrecoded with their MIME type sniffed from magic bytes, since the
//! upstream layout stage already chose a format.

use crate::error::ExtractionError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// An image to extract from, in whichever form the caller has it.
#[derive(Debug, Clone)]
pub enum ImagePayload {
    /// Encoded image bytes (PNG, JPEG, …). `mime` overrides sniffing when
    /// the caller knows the format; otherwise magic bytes decide.
    Bytes {
        data: Vec<u8>,
        mime: Option<String>,
    },
    /// A decoded in-memory image; PNG-encoded for transport.
    Image(DynamicImage),
    /// An already-built `data:` URI, passed through untouched.
    DataUri(String),
}

impl ImagePayload {
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        ImagePayload::Bytes {
            data: data.into(),
            mime: None,
        }
    }

    pub fn from_bytes_with_mime(data: impl Into<Vec<u8>>, mime: impl Into<String>) -> Self {
        ImagePayload::Bytes {
            data: data.into(),
            mime: Some(mime.into()),
        }
    }

    /// True when there is nothing to send.
    pub fn is_empty(&self) -> bool {
        match self {
            ImagePayload::Bytes { data, .. } => data.is_empty(),
            ImagePayload::Image(img) => img.width() == 0 || img.height() == 0,
            ImagePayload::DataUri(uri) => uri.is_empty(),
        }
    }
}

impl From<DynamicImage> for ImagePayload {
    fn from(img: DynamicImage) -> Self {
        ImagePayload::Image(img)
    }
}

impl From<Vec<u8>> for ImagePayload {
    fn from(data: Vec<u8>) -> Self {
        ImagePayload::from_bytes(data)
    }
}

/// Encode a payload into the transport form: a `data:<mime>;base64,…` URI.
pub fn to_data_uri(payload: &ImagePayload) -> Result<String, ExtractionError> {
    match payload {
        ImagePayload::Bytes { data, mime } => {
            let mime = mime
                .as_deref()
                .unwrap_or_else(|| sniff_mime(data))
                .to_string();
            let b64 = STANDARD.encode(data);
            debug!(mime = %mime, bytes = data.len(), "encoded image bytes for transport");
            Ok(format!("data:{mime};base64,{b64}"))
        }
        ImagePayload::Image(img) => {
            let mut buf = Vec::new();
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
                .map_err(|e| ExtractionError::Encode(e.to_string()))?;
            let b64 = STANDARD.encode(&buf);
            debug!(bytes = buf.len(), "PNG-encoded in-memory image for transport");
            Ok(format!("data:image/png;base64,{b64}"))
        }
        ImagePayload::DataUri(uri) => {
            if uri.starts_with("data:") {
                Ok(uri.clone())
            } else {
                Err(ExtractionError::Encode(format!(
                    "not a data URI: '{}'",
                    uri.chars().take(40).collect::<String>()
                )))
            }
        }
    }
}

/// Decode a `data:<mime>;base64,…` URI back into `(mime, bytes)`.
///
/// The inverse of [`to_data_uri`] for byte payloads; used by stub serving
/// collaborators and round-trip tests.
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (mime, b64) = rest.split_once(";base64,")?;
    let bytes = STANDARD.decode(b64).ok()?;
    Some((mime.to_string(), bytes))
}

/// MIME type from magic bytes, defaulting to PNG for unknown formats —
/// the upstream layout stage emits PNG crops, so unknown almost always
/// means "PNG with an exotic chunk layout", and servers sniff anyway.
fn sniff_mime(data: &[u8]) -> &'static str {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() > 11 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/png"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn bytes_round_trip_through_data_uri() {
        let original: Vec<u8> = vec![0x89, b'P', b'N', b'G', 1, 2, 3, 4, 5];
        let payload = ImagePayload::from_bytes(original.clone());
        let uri = to_data_uri(&payload).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));

        let (mime, bytes) = decode_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, original);
    }

    #[test]
    fn jpeg_magic_is_sniffed() {
        let payload = ImagePayload::from_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00]);
        let uri = to_data_uri(&payload).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn explicit_mime_overrides_sniffing() {
        let payload =
            ImagePayload::from_bytes_with_mime(vec![0xFF, 0xD8, 0xFF], "image/custom");
        let uri = to_data_uri(&payload).unwrap();
        assert!(uri.starts_with("data:image/custom;base64,"));
    }

    #[test]
    fn dynamic_image_encodes_as_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            8,
            8,
            Rgba([255, 0, 0, 255]),
        ));
        let uri = to_data_uri(&ImagePayload::from(img)).unwrap();
        let (mime, bytes) = decode_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/png");
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn non_data_uri_passthrough_is_rejected() {
        let payload = ImagePayload::DataUri("http://example.com/cat.png".into());
        assert!(matches!(
            to_data_uri(&payload),
            Err(ExtractionError::Encode(_))
        ));
    }

    #[test]
    fn emptiness_checks() {
        assert!(ImagePayload::from_bytes(Vec::<u8>::new()).is_empty());
        assert!(!ImagePayload::from_bytes(vec![1]).is_empty());
        assert!(ImagePayload::DataUri(String::new()).is_empty());
    }
}
