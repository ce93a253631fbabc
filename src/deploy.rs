//! Deployment data model: versions, hardware snapshots, candidates, and the
//! resolved endpoint.
//!
//! Everything here is plain data. A [`DeploymentCandidate`] is immutable once
//! constructed, a [`HardwareProfile`] is a read-only snapshot captured before
//! resolution starts, and a [`ResolvedEndpoint`] never changes for the
//! lifetime of the client bound to it. Keeping the model free of behaviour
//! means candidate lists can be loaded from JSON, logged, and diffed between
//! runs without dragging network code along.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// A CUDA(-equivalent) runtime version, e.g. `12.2`.
///
/// Ordered so the resolver's static filter can compare a candidate's minimum
/// requirement against the detected hardware version. Serialises as the
/// familiar `"major.minor"` string rather than a struct, so candidate JSON
/// files read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CudaVersion {
    pub major: u16,
    pub minor: u16,
}

impl CudaVersion {
    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for CudaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for CudaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| format!("expected 'major.minor', got '{s}'"))?;
        let major = major
            .parse::<u16>()
            .map_err(|e| format!("bad major version in '{s}': {e}"))?;
        let minor = minor
            .parse::<u16>()
            .map_err(|e| format!("bad minor version in '{s}': {e}"))?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for CudaVersion {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CudaVersion> for String {
    fn from(v: CudaVersion) -> Self {
        v.to_string()
    }
}

/// What kind of compute device the serving runtime will execute on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Gpu,
    Cpu,
}

/// A read-only snapshot of the execution environment, captured once per
/// resolution attempt and never re-probed mid-resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub device: DeviceKind,
    /// GPU driver version string as reported by the driver, e.g. `"550.54.14"`.
    pub driver_version: Option<String>,
    /// CUDA-equivalent runtime version the driver supports. `None` on CPU-only
    /// hosts, which fails every candidate's version gate by definition.
    pub runtime_version: Option<CudaVersion>,
    /// Total device memory in MiB, when known.
    pub total_memory_mb: Option<u64>,
}

impl HardwareProfile {
    /// A GPU profile with a known runtime version.
    pub fn gpu(runtime_version: CudaVersion) -> Self {
        Self {
            device: DeviceKind::Gpu,
            driver_version: None,
            runtime_version: Some(runtime_version),
            total_memory_mb: None,
        }
    }

    /// A CPU-only profile: no driver, no CUDA runtime.
    pub fn cpu() -> Self {
        Self {
            device: DeviceKind::Cpu,
            driver_version: None,
            runtime_version: None,
            total_memory_mb: None,
        }
    }

    pub fn with_driver_version(mut self, driver: impl Into<String>) -> Self {
        self.driver_version = Some(driver.into());
        self
    }

    pub fn with_total_memory_mb(mut self, mb: u64) -> Self {
        self.total_memory_mb = Some(mb);
        self
    }

    /// Detect the local hardware by shelling out to `nvidia-smi`.
    ///
    /// Best-effort: any failure (binary missing, no GPU, unparsable output)
    /// degrades to [`HardwareProfile::cpu`] rather than erroring, because a
    /// missing GPU is an ordinary configuration this crate must resolve
    /// around, not an exceptional one.
    pub async fn detect() -> Self {
        let output = match tokio::process::Command::new("nvidia-smi").output().await {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).into_owned(),
            Ok(out) => {
                warn!(
                    "nvidia-smi exited with {}; assuming CPU-only host",
                    out.status
                );
                return Self::cpu();
            }
            Err(e) => {
                debug!("nvidia-smi not available ({e}); assuming CPU-only host");
                return Self::cpu();
            }
        };

        let driver_version = RE_DRIVER
            .captures(&output)
            .map(|c| c[1].to_string());
        let runtime_version = RE_CUDA
            .captures(&output)
            .and_then(|c| c[1].parse::<CudaVersion>().ok());

        if runtime_version.is_none() {
            warn!("could not parse a CUDA version from nvidia-smi output; assuming CPU-only host");
            return Self::cpu();
        }

        let total_memory_mb = query_total_memory_mb().await;
        debug!(
            ?driver_version,
            ?runtime_version,
            ?total_memory_mb,
            "detected GPU hardware profile"
        );

        Self {
            device: DeviceKind::Gpu,
            driver_version,
            runtime_version,
            total_memory_mb,
        }
    }
}

static RE_DRIVER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Driver Version:\s*([\d.]+)").unwrap());
static RE_CUDA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CUDA Version:\s*(\d+\.\d+)").unwrap());

/// Total memory of GPU 0 in MiB, via a machine-readable `nvidia-smi` query.
async fn query_total_memory_mb() -> Option<u64> {
    let out = tokio::process::Command::new("nvidia-smi")
        .args(["--query-gpu=memory.total", "--format=csv,noheader,nounits"])
        .output()
        .await
        .ok()?;
    if !out.status.success() {
        return None;
    }
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .next()?
        .trim()
        .parse()
        .ok()
}

/// One (serving image version, model) configuration pairing under trial.
///
/// Candidates are supplied to the resolver as an ordered sequence; position
/// is priority (first viable wins), so put cheaper/safer configurations
/// first and the guaranteed-slow CPU fallback last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentCandidate {
    /// Serving runtime image identifier, e.g. `"vllm/vllm-openai:v0.7.0"`.
    pub image: String,
    /// Model identifier the server will load, e.g. `"Qwen/Qwen3-VL-8B-Instruct"`.
    pub model: String,
    /// Minimum driver/CUDA runtime version this image requires.
    pub min_runtime: CudaVersion,
    /// Whether the model accepts image input. Candidates without it are
    /// filtered before bring-up whenever the caller requires multimodal.
    #[serde(default = "default_true")]
    pub multimodal: bool,
    /// Whether this candidate may run on CPU-only hosts. CPU execution is
    /// never skipped outright on such hosts, only deferred to the end of the
    /// trial order.
    #[serde(default)]
    pub allow_cpu: bool,
    /// Base URL of the OpenAI-compatible API the server will expose,
    /// including the `/v1` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Whether the served model accepts video input.
    #[serde(default)]
    pub supports_video: bool,
    /// How many images one chat request may carry.
    #[serde(default = "default_max_images")]
    pub max_images_per_request: u32,
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:8888/v1".to_string()
}

fn default_max_images() -> u32 {
    1
}

impl DeploymentCandidate {
    /// A multimodal GPU candidate with the default local base URL.
    pub fn new(
        image: impl Into<String>,
        model: impl Into<String>,
        min_runtime: CudaVersion,
    ) -> Self {
        Self {
            image: image.into(),
            model: model.into(),
            min_runtime,
            multimodal: true,
            allow_cpu: false,
            base_url: default_base_url(),
            supports_video: false,
            max_images_per_request: default_max_images(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn multimodal(mut self, v: bool) -> Self {
        self.multimodal = v;
        self
    }

    pub fn allow_cpu(mut self, v: bool) -> Self {
        self.allow_cpu = v;
        self
    }

    pub fn supports_video(mut self, v: bool) -> Self {
        self.supports_video = v;
        self
    }

    pub fn max_images_per_request(mut self, n: u32) -> Self {
        self.max_images_per_request = n;
        self
    }

    /// Identifier used in logs and the failure ledger.
    pub fn id(&self) -> String {
        format!("{} ({})", self.image, self.model)
    }
}

/// The single configuration selected by resolution.
///
/// Immutable for the lifetime of any client bound to it; re-resolution
/// produces a new value and requires constructing a new client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEndpoint {
    /// OpenAI-compatible API base, e.g. `"http://localhost:8888/v1"`.
    pub base_url: String,
    /// Model identifier to put in every request body.
    pub model: String,
    /// Serving image that won resolution, kept for diagnostics.
    pub image: String,
    pub supports_video: bool,
    pub max_images_per_request: u32,
}

impl ResolvedEndpoint {
    /// Build the endpoint for a candidate that passed its health probe.
    pub fn from_candidate(candidate: &DeploymentCandidate) -> Self {
        Self {
            base_url: candidate.base_url.trim_end_matches('/').to_string(),
            model: candidate.model.clone(),
            image: candidate.image.clone(),
            supports_video: candidate.supports_video,
            max_images_per_request: candidate.max_images_per_request,
        }
    }

    /// An endpoint for a server managed entirely outside this process,
    /// bypassing resolution. The image identifier is recorded as `"external"`.
    pub fn direct(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            image: "external".to_string(),
            supports_video: false,
            max_images_per_request: default_max_images(),
        }
    }
}
