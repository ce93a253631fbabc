//! CLI binary for vlm-extract.
//!
//! A thin shim over the library crate: `resolve` picks a working deployment
//! from a JSON candidate list, `extract` runs typed extraction against a
//! running endpoint and prints the results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vlm_extract::{
    resolve, DeploymentCandidate, ExtractionRequest, HardwareProfile, HttpProbe, ImagePayload,
    NoopBringUp, ResolveOptions, ResolvedEndpoint, TaskKind, VlmClient,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

// ── CLI definition ───────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "vlmx",
    version,
    about = "Extract structured text from document images via a self-hosted VLM"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pick the first working deployment candidate from a JSON list.
    ///
    /// The file is an array of candidates:
    ///   [{"image": "vllm/vllm-openai:v0.7.0",
    ///     "model": "Qwen/Qwen3-VL-8B-Instruct",
    ///     "min_runtime": "12.2"}, ...]
    /// Servers are expected to be brought up externally; this command only
    /// health-probes them in priority order.
    Resolve {
        /// Path to the candidate list (JSON array, priority order).
        #[arg(long, value_name = "FILE")]
        candidates: PathBuf,

        /// Per-attempt health-probe timeout in seconds.
        #[arg(long, default_value_t = 10)]
        probe_timeout_secs: u64,

        /// Probe attempts per candidate.
        #[arg(long, default_value_t = 3)]
        probe_attempts: u32,

        /// Also consider candidates whose model lacks multimodal support.
        #[arg(long)]
        allow_text_only: bool,
    },

    /// Run extraction for one or more image files against a running endpoint.
    Extract {
        /// Image files to process (PNG or JPEG).
        #[arg(required = true, value_name = "IMAGE")]
        images: Vec<PathBuf>,

        /// Extraction task: table, chart, figure, image, or formula.
        #[arg(long, short = 't', default_value = "table")]
        task: String,

        /// OpenAI-compatible API base URL, including /v1.
        #[arg(long, env = "VLM_API_BASE", default_value = "http://localhost:8888/v1")]
        api_base: String,

        /// Model identifier to request.
        #[arg(long, env = "VLM_MODEL", default_value = "Qwen/Qwen3-VL-8B-Instruct")]
        model: String,

        /// API key, if the server requires one.
        #[arg(long, env = "VLM_API_KEY")]
        api_key: Option<String>,

        /// Override the task's default prompt.
        #[arg(long)]
        prompt: Option<String>,

        /// Per-request timeout in seconds.
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,

        /// Concurrent requests when processing multiple images.
        #[arg(long, short = 'c', default_value_t = 4)]
        concurrency: usize,

        /// Emit one JSON object per image instead of plain text.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Resolve {
            candidates,
            probe_timeout_secs,
            probe_attempts,
            allow_text_only,
        } => {
            cmd_resolve(
                &candidates,
                probe_timeout_secs,
                probe_attempts,
                allow_text_only,
            )
            .await
        }
        Command::Extract {
            images,
            task,
            api_base,
            model,
            api_key,
            prompt,
            timeout_secs,
            concurrency,
            json,
        } => {
            let task: TaskKind = task.parse().map_err(anyhow::Error::msg)?;
            cmd_extract(
                images,
                task,
                api_base,
                model,
                api_key,
                prompt,
                timeout_secs,
                concurrency,
                json,
            )
            .await
        }
    }
}

async fn cmd_resolve(
    candidates_path: &PathBuf,
    probe_timeout_secs: u64,
    probe_attempts: u32,
    allow_text_only: bool,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(candidates_path)
        .await
        .with_context(|| format!("reading candidate list '{}'", candidates_path.display()))?;
    let candidates: Vec<DeploymentCandidate> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing candidate list '{}'", candidates_path.display()))?;

    let hardware = HardwareProfile::detect().await;
    eprintln!(
        "{} device: {:?}, CUDA: {}",
        dim("hardware"),
        hardware.device,
        hardware
            .runtime_version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none".into()),
    );

    let options = ResolveOptions {
        probe_timeout: Duration::from_secs(probe_timeout_secs),
        probe_attempts,
        require_multimodal: !allow_text_only,
    };

    match resolve(&candidates, &hardware, &NoopBringUp, &HttpProbe::new(), &options).await {
        Ok(endpoint) => {
            eprintln!("{} {}", green("✔"), endpoint.image);
            println!("{}", serde_json::to_string_pretty(&endpoint)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", red("✘"), e);
            std::process::exit(1);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_extract(
    images: Vec<PathBuf>,
    task: TaskKind,
    api_base: String,
    model: String,
    api_key: Option<String>,
    prompt: Option<String>,
    timeout_secs: u64,
    concurrency: usize,
    json: bool,
) -> Result<()> {
    let endpoint = ResolvedEndpoint::direct(api_base, model);
    let mut builder =
        VlmClient::builder(endpoint).timeout(Duration::from_secs(timeout_secs));
    if let Some(key) = api_key {
        builder = builder.api_key(key);
    }
    let client = builder.build();

    let mut requests = Vec::with_capacity(images.len());
    for path in &images {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading image '{}'", path.display()))?;
        let mut req = ExtractionRequest::new(task, ImagePayload::from_bytes(bytes));
        if let Some(ref p) = prompt {
            req = req.with_prompt(p.clone());
        }
        requests.push(req);
    }

    let results = client.extract_batch(requests, concurrency).await;

    let mut failed = 0usize;
    for (path, result) in images.iter().zip(results) {
        match result {
            Ok(r) if json => {
                let mut v = serde_json::to_value(&r)?;
                v["file"] = serde_json::Value::String(path.display().to_string());
                println!("{v}");
            }
            Ok(r) => {
                eprintln!(
                    "{} {}  {}",
                    green("✓"),
                    path.display(),
                    dim(&format!(
                        "{} chars, {} tok in / {} tok out, {:.1}s",
                        r.text.len(),
                        r.prompt_tokens,
                        r.completion_tokens,
                        r.duration_ms as f64 / 1000.0
                    )),
                );
                println!("{}\n", r.text);
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {}  {}", red("✗"), path.display(), red(&e.to_string()));
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed}/{} image(s) failed", images.len());
    }
    Ok(())
}
