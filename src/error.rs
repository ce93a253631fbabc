//! Error types for the vlm-extract library.
//!
//! Two distinct error types reflect the two phases of the crate's job:
//!
//! * [`ResolveError`] — deployment resolution failed. Either the caller's
//!   configuration is unusable (no candidates, bad endpoint spec) or every
//!   candidate was tried and rejected. The `Exhausted` variant carries a
//!   per-candidate failure ledger, because the root cause of a fleet-wide
//!   failure is usually a version mismatch that only the aggregate view
//!   reveals.
//!
//! * [`ExtractionError`] — a single extraction call failed. The variant
//!   encodes whether a retry can help: see [`ExtractionError::is_retryable`].
//!
//! Neither phase swallows failures; every error carries the identifiers
//! (candidate, HTTP status, timeout) needed to diagnose without re-running.

use crate::deploy::CudaVersion;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`crate::resolver::resolve`].
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The candidate list was empty. Nothing was probed.
    #[error(
        "no deployment candidates configured\n\
         Supply at least one (image, model) pair in priority order."
    )]
    NoCandidates,

    /// A candidate's base URL is not an absolute HTTP/HTTPS URL.
    ///
    /// This is a configuration error: it is detected before any bring-up
    /// and aborts resolution immediately rather than being recorded in the
    /// ledger, since the same list would fail identically on every retry.
    #[error("invalid endpoint spec '{url}' for candidate '{candidate}': {detail}")]
    InvalidEndpoint {
        candidate: String,
        url: String,
        detail: String,
    },

    /// Every candidate was rejected. The ledger has one entry per candidate.
    #[error(
        "all {} deployment candidate(s) failed:\n{}",
        .attempts.len(),
        format_ledger(.attempts)
    )]
    Exhausted { attempts: Vec<CandidateFailure> },
}

impl ResolveError {
    /// The per-candidate failure ledger, if this is an `Exhausted` error.
    pub fn ledger(&self) -> Option<&[CandidateFailure]> {
        match self {
            ResolveError::Exhausted { attempts } => Some(attempts),
            _ => None,
        }
    }
}

fn format_ledger(attempts: &[CandidateFailure]) -> String {
    attempts
        .iter()
        .map(|a| format!("  - {}: {}", a.candidate, a.reason))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One rejected candidate and why.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateFailure {
    /// Candidate identifier: `"<image> (<model>)"`.
    pub candidate: String,
    pub reason: FailureReason,
}

/// Why a specific candidate was rejected during resolution.
///
/// Version mismatches and multimodal rejections are static (no network call
/// was made); bring-up and probe failures happened against a live runtime.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Static filter: the candidate needs a newer CUDA runtime than the
    /// hardware provides.
    #[error("requires CUDA {required}, hardware has {available}")]
    RuntimeTooOld {
        required: CudaVersion,
        available: String,
    },

    /// Static filter: the caller requires multimodal support and this
    /// candidate's model does not have it.
    #[error("model lacks multimodal support")]
    NotMultimodal,

    /// The bring-up collaborator rejected the candidate (e.g. the container
    /// runtime refused the image due to a driver mismatch).
    #[error("bring-up failed: {0}")]
    BringUp(String),

    /// The serving process came up but never answered the health probe.
    #[error("health probe failed after {attempts} attempt(s) of {timeout:?} each")]
    ProbeExhausted {
        attempts: u32,
        #[serde(skip)]
        timeout: Duration,
    },
}

/// Error returned by the bring-up collaborator.
///
/// Bring-up mechanisms are external (container CLI, systemd, ssh); the
/// resolver only needs a human-readable reason to record in the ledger.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BringUpError(pub String);

/// Errors returned by [`crate::client::VlmClient`] extraction calls.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The request's image payload was empty.
    ///
    /// This is the only payload validation the client performs; content
    /// correctness is the model's responsibility.
    #[error("image payload is empty")]
    EmptyImage,

    /// An in-memory image could not be encoded for transport.
    #[error("failed to encode image for transport: {0}")]
    Encode(String),

    /// The endpoint could not be reached, or the call timed out.
    /// Retryable with backoff.
    #[error("VLM endpoint unavailable: {detail}")]
    Unavailable { detail: String },

    /// The server answered with a non-2xx status.
    /// Retryable only for 5xx; a 4xx means the request shape is wrong.
    #[error("VLM server rejected the request (HTTP {status}): {body}")]
    ServerRejected { status: u16, body: String },

    /// The response body did not match the OpenAI-compatible contract
    /// (unparsable JSON, no choices, or no message content). Never retryable
    /// without changing the request — it signals a contract mismatch with
    /// the serving collaborator.
    #[error("malformed VLM response: {detail}")]
    MalformedResponse { detail: String },
}

impl ExtractionError {
    /// Whether retrying the same request may succeed.
    ///
    /// `Unavailable` and 5xx `ServerRejected` errors are transient
    /// (overloaded backend, network blip); everything else is a defect in
    /// the request or in the serving contract.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Unavailable { .. } => true,
            ExtractionError::ServerRejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(candidate: &str, reason: FailureReason) -> CandidateFailure {
        CandidateFailure {
            candidate: candidate.to_string(),
            reason,
        }
    }

    #[test]
    fn exhausted_display_enumerates_every_candidate() {
        let e = ResolveError::Exhausted {
            attempts: vec![
                failure(
                    "vllm/vllm-openai:latest (Qwen/Qwen3-VL-8B-Instruct)",
                    FailureReason::RuntimeTooOld {
                        required: CudaVersion::new(12, 9),
                        available: "12.2".into(),
                    },
                ),
                failure(
                    "vllm/vllm-openai:v0.7.0 (Qwen/Qwen3-VL-8B-Instruct)",
                    FailureReason::ProbeExhausted {
                        attempts: 3,
                        timeout: Duration::from_secs(10),
                    },
                ),
            ],
        };
        let msg = e.to_string();
        assert!(msg.contains("all 2 deployment candidate(s) failed"), "got: {msg}");
        assert!(msg.contains("vllm/vllm-openai:latest"), "got: {msg}");
        assert!(msg.contains("requires CUDA 12.9, hardware has 12.2"), "got: {msg}");
        assert!(msg.contains("vllm/vllm-openai:v0.7.0"), "got: {msg}");
        assert!(msg.contains("3 attempt(s)"), "got: {msg}");
    }

    #[test]
    fn no_candidates_display() {
        let msg = ResolveError::NoCandidates.to_string();
        assert!(msg.contains("no deployment candidates"), "got: {msg}");
    }

    #[test]
    fn bring_up_reason_display() {
        let r = FailureReason::BringUp("runtime rejected image: driver too old".into());
        assert!(r.to_string().contains("driver too old"));
    }

    #[test]
    fn retryable_classification() {
        assert!(ExtractionError::Unavailable { detail: "timeout".into() }.is_retryable());
        assert!(ExtractionError::ServerRejected { status: 503, body: String::new() }.is_retryable());
        assert!(!ExtractionError::ServerRejected { status: 400, body: String::new() }.is_retryable());
        assert!(!ExtractionError::MalformedResponse { detail: "no content".into() }.is_retryable());
        assert!(!ExtractionError::EmptyImage.is_retryable());
    }

    #[test]
    fn server_rejected_display_has_status_and_body() {
        let e = ExtractionError::ServerRejected {
            status: 500,
            body: "Internal Server Error".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("500"));
        assert!(msg.contains("Internal Server Error"));
    }
}
