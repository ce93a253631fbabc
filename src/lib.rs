//! # vlm-extract
//!
//! Structured text extraction from document images (tables, charts, figures)
//! via a self-hosted Vision Language Model behind an OpenAI-compatible API.
//!
//! ## Why this crate?
//!
//! Self-hosting a VLM means living with unreliable compatibility between the
//! serving runtime, the GPU driver/CUDA generation, and the model itself: an
//! image tag that works on one host fails its health check on the next, and
//! the fix is usually "try the previous release" or "swap the model". This
//! crate turns that manual trial-and-error into two small, composable pieces:
//!
//! * a **compatibility resolver** that walks an ordered candidate list
//!   (serving image × model), statically filters what the hardware cannot
//!   run, brings up and health-probes the rest, and returns the first live
//!   endpoint — or a ledger naming why every candidate was rejected;
//! * an **extraction client** bound to the resolved endpoint, with typed
//!   table/chart/figure/image/formula operations, one HTTP call per
//!   extraction, and a normalised error taxonomy.
//!
//! ## Flow
//!
//! ```text
//! candidates (ordered)
//!  │
//!  ├─ 1. Filter   static gate: CUDA version, multimodal support
//!  ├─ 2. Bring-up start / point at the serving process (external)
//!  ├─ 3. Probe    GET /health with bounded retries
//!  └─ 4. Bind     ResolvedEndpoint ──▶ VlmClient ──▶ extract per image
//! ```
//!
//! The resolver and client are deliberately decoupled: the client never
//! re-resolves on its own. On persistent failure, callers run [`resolve`]
//! again (perhaps with an expanded candidate list) and construct a new
//! client.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use vlm_extract::{
//!     resolve, DeploymentCandidate, HardwareProfile, HttpProbe, NoopBringUp,
//!     ResolveOptions, VlmClient,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let candidates = vec![
//!         DeploymentCandidate::new("vllm/vllm-openai:v0.7.0", "Qwen/Qwen3-VL-8B-Instruct", "12.2".parse()?),
//!         DeploymentCandidate::new("vllm/vllm-openai:v0.6.3-post1", "Qwen/Qwen2.5-VL-7B-Instruct", "12.1".parse()?),
//!     ];
//!     let hardware = HardwareProfile::detect().await;
//!     let endpoint = resolve(
//!         &candidates,
//!         &hardware,
//!         &NoopBringUp,
//!         &HttpProbe::new(),
//!         &ResolveOptions::default(),
//!     )
//!     .await?;
//!
//!     let client = VlmClient::builder(endpoint).build();
//!     let table = client.process_table(std::fs::read("crop.png")?).await?;
//!     println!("{}", table.text);
//!     Ok(())
//! }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod deploy;
pub mod encode;
pub mod error;
pub mod postprocess;
pub mod prompts;
pub mod resolver;
pub mod wire;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{ExtractionRequest, ExtractionResult, TaskKind, VlmClient, VlmClientBuilder};
pub use deploy::{
    CudaVersion, DeploymentCandidate, DeviceKind, HardwareProfile, ResolvedEndpoint,
};
pub use encode::ImagePayload;
pub use error::{
    BringUpError, CandidateFailure, ExtractionError, FailureReason, ResolveError,
};
pub use resolver::{resolve, BringUp, HttpProbe, NoopBringUp, Probe, ResolveOptions};
