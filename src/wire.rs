//! Wire types for the OpenAI-compatible chat-completions endpoint.
//!
//! Typed structs rather than ad-hoc `json!` literals: the request shape is a
//! contract with the serving collaborator, and a typed shape can be
//! unit-tested without a server. Response types are deliberately lenient —
//! every field a server might omit is `Option` or defaulted, so a contract
//! mismatch surfaces as a precise "missing content" error in the client
//! instead of a serde parse failure naming an irrelevant field.

use serde::{Deserialize, Serialize};

/// POST body for `{base_url}/chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// One conversation turn. Extraction requests are single-turn: one user
/// message carrying the image and the task prompt.
#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    /// A user turn with the image first and the instruction text second,
    /// matching the content order the serving recipes document.
    pub fn user(image_data_uri: String, prompt: String) -> Self {
        Self {
            role: "user",
            content: vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_data_uri,
                    },
                },
                ContentPart::Text { text: prompt },
            ],
        }
    }
}

/// Multimodal message content: a base64 data-URI image or plain text.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    ImageUrl { image_url: ImageUrl },
    Text { text: String },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Response body of `{base_url}/chat/completions`.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token accounting reported by the server.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}
