//! Multimodal extraction client: typed task requests against a resolved
//! endpoint.
//!
//! One [`extract`](VlmClient::extract) call is exactly one HTTP POST to the
//! endpoint's chat-completions path. The client performs **no internal
//! retry**: extraction failures are usually content- or prompt-related, not
//! availability-related, so retry policy belongs to the caller —
//! [`crate::error::ExtractionError::is_retryable`] tells it which failures
//! are worth repeating.
//!
//! A client holds no mutable state beyond its immutable endpoint binding, so
//! concurrent `extract` calls on one instance are independent;
//! [`extract_batch`](VlmClient::extract_batch) exploits this with bounded
//! parallelism over a shared client.

use crate::deploy::ResolvedEndpoint;
use crate::encode::{self, ImagePayload};
use crate::error::ExtractionError;
use crate::postprocess;
use crate::prompts;
use crate::wire::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What kind of document block the image contains, which selects the default
/// instruction template.
///
/// The prompt mapping in [`crate::prompts::default_prompt`] is total over
/// this enum; a new kind cannot exist without a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Transcribe a table as Markdown.
    Table,
    /// Summarise a chart's data and trends.
    Chart,
    /// Describe a figure's content and purpose.
    Figure,
    /// Describe a plain embedded image.
    Image,
    /// Transcribe a formula as LaTeX.
    Formula,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Table => "table",
            TaskKind::Chart => "chart",
            TaskKind::Figure => "figure",
            TaskKind::Image => "image",
            TaskKind::Formula => "formula",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(TaskKind::Table),
            "chart" => Ok(TaskKind::Chart),
            "figure" => Ok(TaskKind::Figure),
            "image" => Ok(TaskKind::Image),
            "formula" => Ok(TaskKind::Formula),
            other => Err(format!(
                "unknown task kind '{other}' (expected table, chart, figure, image, or formula)"
            )),
        }
    }
}

/// One extraction call: an image, a task kind, and an optional prompt
/// override. Constructed per call and not retained.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub image: ImagePayload,
    pub task: TaskKind,
    pub prompt: Option<String>,
}

impl ExtractionRequest {
    pub fn new(task: TaskKind, image: impl Into<ImagePayload>) -> Self {
        Self {
            image: image.into(),
            task,
            prompt: None,
        }
    }

    /// Override the default instruction template for this request only.
    /// The task kind recorded in the result is unchanged.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// A successful extraction: the text plus the response metadata needed for
/// accounting and diagnostics. Empty `text` is a valid answer, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub task: TaskKind,
    pub text: String,
    /// Model identifier the server reports having used.
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub finish_reason: Option<String>,
    pub duration_ms: u64,
}

/// Client for typed multimodal extraction against one [`ResolvedEndpoint`].
///
/// Bound to exactly one endpoint for its lifetime; re-resolving requires
/// constructing a new client. Cheap to clone-by-reference across tasks
/// (`reqwest::Client` is internally reference-counted).
pub struct VlmClient {
    endpoint: ResolvedEndpoint,
    http: reqwest::Client,
    api_key: Option<String>,
    timeout: Duration,
    temperature: f32,
    max_tokens: u32,
}

impl VlmClient {
    /// Start building a client bound to `endpoint`.
    pub fn builder(endpoint: ResolvedEndpoint) -> VlmClientBuilder {
        VlmClientBuilder {
            endpoint,
            api_key: None,
            timeout: Duration::from_secs(120),
            temperature: 0.1,
            max_tokens: 2048,
        }
    }

    /// A client with all defaults.
    pub fn new(endpoint: ResolvedEndpoint) -> Self {
        Self::builder(endpoint).build()
    }

    /// The endpoint this client is bound to.
    pub fn endpoint(&self) -> &ResolvedEndpoint {
        &self.endpoint
    }

    /// Run one extraction: encode the image, POST a single-turn conversation,
    /// parse the response.
    ///
    /// Exactly one outbound request per invocation; no retry. See
    /// [`crate::error::ExtractionError`] for the failure taxonomy.
    pub async fn extract(
        &self,
        request: ExtractionRequest,
    ) -> Result<ExtractionResult, ExtractionError> {
        if request.image.is_empty() {
            return Err(ExtractionError::EmptyImage);
        }
        let start = Instant::now();

        let data_uri = encode::to_data_uri(&request.image)?;
        let prompt = request
            .prompt
            .unwrap_or_else(|| prompts::default_prompt(request.task).to_string());

        let body = ChatCompletionRequest {
            model: self.endpoint.model.clone(),
            messages: vec![ChatMessage::user(data_uri, prompt)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.endpoint.base_url);
        debug!(%url, task = %request.task, model = %self.endpoint.model, "sending extraction request");

        let mut req = self.http.post(&url).timeout(self.timeout).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(%url, timeout = ?self.timeout, "extraction request timed out");
                return Err(ExtractionError::Unavailable {
                    detail: format!("request timed out after {:?}", self.timeout),
                });
            }
            Err(e) => {
                warn!(%url, error = %e, "extraction request failed");
                return Err(ExtractionError::Unavailable {
                    detail: e.to_string(),
                });
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%url, status = status.as_u16(), "extraction request rejected");
            return Err(ExtractionError::ServerRejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse =
            resp.json()
                .await
                .map_err(|e| ExtractionError::MalformedResponse {
                    detail: format!("response body is not valid JSON: {e}"),
                })?;

        let choice =
            parsed
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ExtractionError::MalformedResponse {
                    detail: "response contained no choices".to_string(),
                })?;
        let content =
            choice
                .message
                .content
                .ok_or_else(|| ExtractionError::MalformedResponse {
                    detail: "choices[0].message.content is missing".to_string(),
                })?;

        let usage = parsed.usage.unwrap_or_default();
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            task = %request.task,
            chars = content.len(),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            duration_ms,
            "extraction complete"
        );

        Ok(ExtractionResult {
            task: request.task,
            text: postprocess::tidy(&content),
            model: parsed.model.unwrap_or_else(|| self.endpoint.model.clone()),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            finish_reason: choice.finish_reason,
            duration_ms,
        })
    }

    /// Transcribe a table image as Markdown.
    pub async fn process_table(
        &self,
        image: impl Into<ImagePayload>,
    ) -> Result<ExtractionResult, ExtractionError> {
        self.extract(ExtractionRequest::new(TaskKind::Table, image)).await
    }

    /// Summarise a chart image.
    pub async fn process_chart(
        &self,
        image: impl Into<ImagePayload>,
    ) -> Result<ExtractionResult, ExtractionError> {
        self.extract(ExtractionRequest::new(TaskKind::Chart, image)).await
    }

    /// Describe a figure image.
    pub async fn process_figure(
        &self,
        image: impl Into<ImagePayload>,
    ) -> Result<ExtractionResult, ExtractionError> {
        self.extract(ExtractionRequest::new(TaskKind::Figure, image)).await
    }

    /// Describe a plain embedded image.
    pub async fn process_image(
        &self,
        image: impl Into<ImagePayload>,
    ) -> Result<ExtractionResult, ExtractionError> {
        self.extract(ExtractionRequest::new(TaskKind::Image, image)).await
    }

    /// Transcribe a formula image as LaTeX.
    pub async fn process_formula(
        &self,
        image: impl Into<ImagePayload>,
    ) -> Result<ExtractionResult, ExtractionError> {
        self.extract(ExtractionRequest::new(TaskKind::Formula, image)).await
    }

    /// Run many extractions against this client with bounded concurrency.
    ///
    /// Results come back in request order regardless of completion order.
    /// Each request fails or succeeds independently — one bad image does not
    /// abort the batch.
    pub async fn extract_batch(
        &self,
        requests: Vec<ExtractionRequest>,
        concurrency: usize,
    ) -> Vec<Result<ExtractionResult, ExtractionError>> {
        stream::iter(requests.into_iter().map(|r| self.extract(r)))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}

/// Builder for [`VlmClient`].
pub struct VlmClientBuilder {
    endpoint: ResolvedEndpoint,
    api_key: Option<String>,
    timeout: Duration,
    temperature: f32,
    max_tokens: u32,
}

impl VlmClientBuilder {
    /// Bearer token attached to every request. Self-hosted servers usually
    /// run without one.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Per-request timeout. Default: 120 s — VLM inference on a large table
    /// crop routinely takes tens of seconds on modest GPUs.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sampling temperature. Default: 0.1 — near-deterministic output is
    /// what you want for transcription.
    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t.clamp(0.0, 2.0);
        self
    }

    /// Generation cap per request. Default: 2048, which covers dense tables
    /// without letting a runaway response bill unbounded tokens.
    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn build(self) -> VlmClient {
        VlmClient {
            endpoint: self.endpoint,
            http: reqwest::Client::new(),
            api_key: self.api_key,
            timeout: self.timeout,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}
