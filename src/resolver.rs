//! Deployment compatibility resolution: pick the first candidate the
//! environment can actually run.
//!
//! ## Why a resolver?
//!
//! Self-hosted VLM serving breaks along two axes at once: the serving image
//! must match the host's driver/CUDA generation, and the image must support
//! the requested model. Neither incompatibility is reliably knowable up
//! front — the runtime may accept an image and then fail its health check
//! minutes later. [`resolve`] replaces manual trial-and-error with a
//! deterministic walk over an ordered candidate list: statically filter what
//! cannot work, bring up and probe what might, and return either the first
//! healthy endpoint or a ledger naming every rejection.
//!
//! ## Ordering
//!
//! Candidates are tried strictly in list order, never concurrently — two
//! simultaneous bring-ups would contend for the same GPU memory. On CPU-only
//! hosts, candidates that allow CPU execution are deferred to the end of the
//! trial order rather than skipped: CPU serving always "works", just slowly,
//! so it is the fallback of last resort.

use crate::deploy::{DeploymentCandidate, DeviceKind, HardwareProfile, ResolvedEndpoint};
use crate::error::{BringUpError, CandidateFailure, FailureReason, ResolveError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Starts (or points at) a serving process for a candidate.
///
/// Models "start a container running this image+model". The exact container
/// CLI and flags are external; implementations report failure as a
/// [`BringUpError`] with a human-readable reason, which the resolver records
/// in the ledger before advancing to the next candidate.
#[async_trait]
pub trait BringUp: Send + Sync {
    async fn bring_up(&self, candidate: &DeploymentCandidate) -> Result<(), BringUpError>;
}

/// Liveness check against a running serving process.
///
/// One call is one attempt bounded by `timeout`; retry policy lives in the
/// resolver, not here.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, candidate: &DeploymentCandidate, timeout: Duration) -> bool;
}

/// Tuning knobs for [`resolve`].
///
/// The defaults (3 attempts, 10 s per probe) are a starting policy, not a
/// compatibility contract: a slow model download can look exactly like a
/// version incompatibility from the outside, and only the operator knows
/// which is plausible for their weights and network.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Timeout for each individual probe attempt.
    pub probe_timeout: Duration,
    /// Maximum probe attempts per candidate. Linear backoff of one
    /// `probe_timeout` is slept between attempts.
    pub probe_attempts: u32,
    /// Reject candidates whose model lacks multimodal support before
    /// bring-up. On by default: every shipped task kind sends an image.
    pub require_multimodal: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            probe_attempts: 3,
            require_multimodal: true,
        }
    }
}

/// Resolve the first runnable deployment candidate, in priority order.
///
/// For each candidate the resolver applies a static filter (multimodal
/// support, CUDA version gate), then `bring_up`, then up to
/// `options.probe_attempts` health probes. The first healthy probe wins and
/// no further candidates are tried. Total resolution time is bounded by the
/// sum over attempted candidates of bring-up time plus
/// `probe_attempts × probe_timeout` (plus the backoff sleeps between
/// attempts).
///
/// # Errors
///
/// * [`ResolveError::NoCandidates`] — empty list; no collaborator is called.
/// * [`ResolveError::InvalidEndpoint`] — a candidate's base URL is not an
///   absolute HTTP/HTTPS URL; fatal, detected before any bring-up.
/// * [`ResolveError::Exhausted`] — every candidate was rejected; the ledger
///   has one entry per candidate with its specific reason.
pub async fn resolve(
    candidates: &[DeploymentCandidate],
    hardware: &HardwareProfile,
    bring_up: &dyn BringUp,
    probe: &dyn Probe,
    options: &ResolveOptions,
) -> Result<ResolvedEndpoint, ResolveError> {
    if candidates.is_empty() {
        return Err(ResolveError::NoCandidates);
    }
    for c in candidates {
        validate_base_url(c)?;
    }

    let (order, mut ledger) = trial_order(candidates, hardware, options);
    info!(
        total = candidates.len(),
        eligible = order.len(),
        statically_rejected = ledger.len(),
        "starting deployment resolution"
    );

    for candidate in order {
        debug!(candidate = %candidate.id(), "bringing up candidate");
        if let Err(e) = bring_up.bring_up(candidate).await {
            warn!(candidate = %candidate.id(), error = %e, "bring-up failed");
            ledger.push(CandidateFailure {
                candidate: candidate.id(),
                reason: FailureReason::BringUp(e.0),
            });
            continue;
        }

        if probe_with_retries(candidate, probe, options).await {
            let endpoint = ResolvedEndpoint::from_candidate(candidate);
            info!(
                candidate = %candidate.id(),
                base_url = %endpoint.base_url,
                "deployment resolved"
            );
            return Ok(endpoint);
        }

        warn!(
            candidate = %candidate.id(),
            attempts = options.probe_attempts,
            "health probe exhausted"
        );
        ledger.push(CandidateFailure {
            candidate: candidate.id(),
            reason: FailureReason::ProbeExhausted {
                attempts: options.probe_attempts,
                timeout: options.probe_timeout,
            },
        });
    }

    Err(ResolveError::Exhausted { attempts: ledger })
}

/// Apply the static filter and compute the trial order.
///
/// Returns the candidates worth bringing up (version-eligible first, then —
/// on CPU hosts only — the deferred `allow_cpu` entries, each group in its
/// original order) alongside ledger entries for candidates rejected outright.
fn trial_order<'a>(
    candidates: &'a [DeploymentCandidate],
    hardware: &HardwareProfile,
    options: &ResolveOptions,
) -> (Vec<&'a DeploymentCandidate>, Vec<CandidateFailure>) {
    let mut eligible = Vec::new();
    let mut deferred = Vec::new();
    let mut ledger = Vec::new();

    let available = match hardware.runtime_version {
        Some(v) => v.to_string(),
        None => "none (CPU-only host)".to_string(),
    };

    for c in candidates {
        if options.require_multimodal && !c.multimodal {
            debug!(candidate = %c.id(), "statically rejected: not multimodal");
            ledger.push(CandidateFailure {
                candidate: c.id(),
                reason: FailureReason::NotMultimodal,
            });
            continue;
        }

        let version_ok = hardware
            .runtime_version
            .map(|v| c.min_runtime <= v)
            .unwrap_or(false);

        if version_ok {
            eligible.push(c);
        } else if hardware.device == DeviceKind::Cpu && c.allow_cpu {
            debug!(candidate = %c.id(), "deferring CPU-capable candidate to end of trial order");
            deferred.push(c);
        } else {
            debug!(
                candidate = %c.id(),
                required = %c.min_runtime,
                available = %available,
                "statically rejected: runtime too old"
            );
            ledger.push(CandidateFailure {
                candidate: c.id(),
                reason: FailureReason::RuntimeTooOld {
                    required: c.min_runtime,
                    available: available.clone(),
                },
            });
        }
    }

    eligible.extend(deferred);
    (eligible, ledger)
}

/// Probe with bounded retries and linear backoff.
///
/// A sleep of one `probe_timeout` between attempts gives a server that is
/// still loading weights a realistic chance to come up without stretching a
/// genuinely broken candidate past `attempts × 2 × timeout`.
async fn probe_with_retries(
    candidate: &DeploymentCandidate,
    probe: &dyn Probe,
    options: &ResolveOptions,
) -> bool {
    for attempt in 1..=options.probe_attempts.max(1) {
        if probe.probe(candidate, options.probe_timeout).await {
            debug!(candidate = %candidate.id(), attempt, "health probe succeeded");
            return true;
        }
        if attempt < options.probe_attempts {
            debug!(
                candidate = %candidate.id(),
                attempt,
                backoff = ?options.probe_timeout,
                "health probe failed, backing off"
            );
            tokio::time::sleep(options.probe_timeout).await;
        }
    }
    false
}

fn validate_base_url(candidate: &DeploymentCandidate) -> Result<(), ResolveError> {
    let url = candidate.base_url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ResolveError::InvalidEndpoint {
            candidate: candidate.id(),
            url: candidate.base_url.clone(),
            detail: "expected an absolute http:// or https:// URL".to_string(),
        })
    }
}

// ── Shipped collaborators ────────────────────────────────────────────────

/// Bring-up that does nothing: the serving process is managed externally
/// (compose file, operator shell, orchestrator) and resolution only selects
/// which already-running endpoint to talk to.
pub struct NoopBringUp;

#[async_trait]
impl BringUp for NoopBringUp {
    async fn bring_up(&self, _candidate: &DeploymentCandidate) -> Result<(), BringUpError> {
        Ok(())
    }
}

/// Health probe over HTTP GET.
///
/// vLLM exposes `/health` at the server root, beside (not under) `/v1`, so
/// the probe strips a trailing `/v1` from the candidate's base URL before
/// appending the health path.
pub struct HttpProbe {
    http: reqwest::Client,
    path: String,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::with_path("/health")
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            path: path.into(),
        }
    }

    fn health_url(&self, candidate: &DeploymentCandidate) -> String {
        let root = candidate
            .base_url
            .trim_end_matches('/')
            .trim_end_matches("/v1");
        format!("{}{}", root.trim_end_matches('/'), self.path)
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, candidate: &DeploymentCandidate, timeout: Duration) -> bool {
        let url = self.health_url(candidate);
        match self.http.get(&url).timeout(timeout).send().await {
            Ok(resp) => {
                let healthy = resp.status().is_success();
                debug!(%url, status = %resp.status(), healthy, "health probe response");
                healthy
            }
            Err(e) => {
                debug!(%url, error = %e, "health probe request failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::CudaVersion;

    fn gpu_candidate(image: &str, min: &str) -> DeploymentCandidate {
        DeploymentCandidate::new(image, "Qwen/Qwen3-VL-8B-Instruct", min.parse().unwrap())
    }

    #[test]
    fn trial_order_keeps_list_order_for_eligible() {
        let candidates = vec![
            gpu_candidate("img:v0.6.3-post1", "12.1"),
            gpu_candidate("img:v0.7.0", "12.2"),
            gpu_candidate("img:latest", "12.9"),
        ];
        let hw = HardwareProfile::gpu(CudaVersion::new(12, 2));
        let (order, ledger) = trial_order(&candidates, &hw, &ResolveOptions::default());

        let images: Vec<&str> = order.iter().map(|c| c.image.as_str()).collect();
        assert_eq!(images, vec!["img:v0.6.3-post1", "img:v0.7.0"]);
        assert_eq!(ledger.len(), 1);
        assert!(ledger[0].candidate.contains("img:latest"));
    }

    #[test]
    fn trial_order_defers_cpu_candidates_to_the_end() {
        let candidates = vec![
            gpu_candidate("img:cpu-capable", "12.1").allow_cpu(true),
            gpu_candidate("img:gpu-only", "12.1"),
        ];
        let hw = HardwareProfile::cpu();
        let (order, ledger) = trial_order(&candidates, &hw, &ResolveOptions::default());

        // On a CPU host nothing passes the version gate; the CPU-capable
        // candidate is deferred (still tried), the GPU-only one is rejected.
        let images: Vec<&str> = order.iter().map(|c| c.image.as_str()).collect();
        assert_eq!(images, vec!["img:cpu-capable"]);
        assert_eq!(ledger.len(), 1);
        assert!(ledger[0].candidate.contains("img:gpu-only"));
    }

    #[test]
    fn trial_order_rejects_non_multimodal_before_version_check() {
        let candidates = vec![gpu_candidate("img:text-only", "12.1").multimodal(false)];
        let hw = HardwareProfile::gpu(CudaVersion::new(12, 2));
        let (order, ledger) = trial_order(&candidates, &hw, &ResolveOptions::default());

        assert!(order.is_empty());
        assert!(matches!(ledger[0].reason, FailureReason::NotMultimodal));
    }

    #[test]
    fn trial_order_can_waive_multimodal_requirement() {
        let candidates = vec![gpu_candidate("img:text-only", "12.1").multimodal(false)];
        let hw = HardwareProfile::gpu(CudaVersion::new(12, 2));
        let opts = ResolveOptions {
            require_multimodal: false,
            ..Default::default()
        };
        let (order, ledger) = trial_order(&candidates, &hw, &opts);
        assert_eq!(order.len(), 1);
        assert!(ledger.is_empty());
    }

    #[test]
    fn base_url_validation() {
        let ok = gpu_candidate("img:v1", "12.1");
        assert!(validate_base_url(&ok).is_ok());

        let bad = gpu_candidate("img:v1", "12.1").base_url("localhost:8888/v1");
        let err = validate_base_url(&bad).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidEndpoint { .. }));
    }

    #[test]
    fn http_probe_health_url_strips_v1() {
        let probe = HttpProbe::new();
        let c = gpu_candidate("img:v1", "12.1").base_url("http://10.0.0.5:8888/v1");
        assert_eq!(probe.health_url(&c), "http://10.0.0.5:8888/health");

        let c = gpu_candidate("img:v1", "12.1").base_url("http://10.0.0.5:8888/v1/");
        assert_eq!(probe.health_url(&c), "http://10.0.0.5:8888/health");
    }
}
