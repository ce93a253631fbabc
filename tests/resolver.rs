//! Resolver scenario tests with counting stub collaborators.
//!
//! Every scenario here is deterministic: bring-up and probe are in-process
//! stubs that record which candidates they were called for, so the tests can
//! assert not only the outcome but also that the resolver never probed a
//! statically rejected candidate and never looked past the first success.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use vlm_extract::{
    resolve, BringUp, BringUpError, CudaVersion, DeploymentCandidate, FailureReason,
    HardwareProfile, Probe, ResolveError, ResolveOptions,
};

// ── Stub collaborators ───────────────────────────────────────────────────────

/// Bring-up that succeeds except for images in `reject`, recording call order.
struct StubBringUp {
    reject: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl StubBringUp {
    fn ok() -> Self {
        Self::rejecting([])
    }

    fn rejecting<const N: usize>(images: [&str; N]) -> Self {
        Self {
            reject: images.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BringUp for StubBringUp {
    async fn bring_up(&self, candidate: &DeploymentCandidate) -> Result<(), BringUpError> {
        self.calls.lock().unwrap().push(candidate.image.clone());
        if self.reject.contains(&candidate.image) {
            Err(BringUpError("runtime rejected image".into()))
        } else {
            Ok(())
        }
    }
}

/// Probe that reports healthy only for images in `healthy`, recording every
/// attempt.
struct StubProbe {
    healthy: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl StubProbe {
    fn healthy<const N: usize>(images: [&str; N]) -> Self {
        Self {
            healthy: images.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn none_healthy() -> Self {
        Self::healthy([])
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, image: &str) -> usize {
        self.calls().iter().filter(|i| *i == image).count()
    }
}

#[async_trait]
impl Probe for StubProbe {
    async fn probe(&self, candidate: &DeploymentCandidate, _timeout: Duration) -> bool {
        self.calls.lock().unwrap().push(candidate.image.clone());
        self.healthy.contains(&candidate.image)
    }
}

/// Probe that becomes healthy on the nth attempt for a given image.
struct FlakyProbe {
    succeed_on: u32,
    calls: Mutex<u32>,
}

#[async_trait]
impl Probe for FlakyProbe {
    async fn probe(&self, _candidate: &DeploymentCandidate, _timeout: Duration) -> bool {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        *calls >= self.succeed_on
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn candidate(image: &str, min: &str) -> DeploymentCandidate {
    DeploymentCandidate::new(image, "Qwen/Qwen3-VL-8B-Instruct", min.parse().unwrap())
}

/// Tiny timeouts so backoff sleeps don't slow the suite down.
fn fast_options() -> ResolveOptions {
    ResolveOptions {
        probe_timeout: Duration::from_millis(5),
        probe_attempts: 3,
        require_multimodal: true,
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_candidate_list_fails_without_probing() {
    let bring_up = StubBringUp::ok();
    let probe = StubProbe::none_healthy();
    let hw = HardwareProfile::gpu(CudaVersion::new(12, 2));

    let err = resolve(&[], &hw, &bring_up, &probe, &fast_options())
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::NoCandidates));
    assert!(bring_up.calls().is_empty());
    assert!(probe.calls().is_empty());
}

#[tokio::test]
async fn single_eligible_candidate_wins_regardless_of_position() {
    // Only the last candidate satisfies the version gate.
    let candidates = vec![
        candidate("img:needs-12.8", "12.8"),
        candidate("img:needs-12.9", "12.9"),
        candidate("img:needs-12.1", "12.1"),
    ];
    let bring_up = StubBringUp::ok();
    let probe = StubProbe::healthy(["img:needs-12.1"]);
    let hw = HardwareProfile::gpu(CudaVersion::new(12, 2));

    let endpoint = resolve(&candidates, &hw, &bring_up, &probe, &fast_options())
        .await
        .unwrap();

    assert_eq!(endpoint.image, "img:needs-12.1");
    assert_eq!(endpoint.model, "Qwen/Qwen3-VL-8B-Instruct");
    // Statically rejected candidates were never brought up or probed.
    assert_eq!(bring_up.calls(), vec!["img:needs-12.1"]);
    assert_eq!(probe.calls(), vec!["img:needs-12.1"]);
}

#[tokio::test]
async fn probe_failure_advances_to_next_candidate() {
    // Fallback chain from a real deployment: v0.6.3-post1 is version-eligible
    // (12.1 ≤ 12.2) and tried first, but its probe fails — a genuine image
    // incompatibility looks exactly like this. v0.7.0 succeeds; `latest`
    // (needs 12.9) must never be probed.
    let candidates = vec![
        candidate("vllm/vllm-openai:v0.6.3-post1", "12.1"),
        candidate("vllm/vllm-openai:v0.7.0", "12.2"),
        candidate("vllm/vllm-openai:latest", "12.9"),
    ];
    let bring_up = StubBringUp::ok();
    let probe = StubProbe::healthy(["vllm/vllm-openai:v0.7.0"]);
    let hw = HardwareProfile::gpu(CudaVersion::new(12, 2));
    let options = fast_options();

    let endpoint = resolve(&candidates, &hw, &bring_up, &probe, &options)
        .await
        .unwrap();

    assert_eq!(endpoint.image, "vllm/vllm-openai:v0.7.0");
    // The failing candidate used all its probe attempts; the winner stopped
    // the walk after one; `latest` was statically filtered.
    assert_eq!(
        probe.calls_for("vllm/vllm-openai:v0.6.3-post1"),
        options.probe_attempts as usize
    );
    assert_eq!(probe.calls_for("vllm/vllm-openai:v0.7.0"), 1);
    assert_eq!(probe.calls_for("vllm/vllm-openai:latest"), 0);
}

#[tokio::test]
async fn all_static_rejections_yield_full_ledger() {
    let candidates = vec![
        candidate("img:needs-12.8", "12.8"),
        candidate("img:needs-12.9", "12.9"),
        candidate("img:needs-13.0", "13.0"),
    ];
    let bring_up = StubBringUp::ok();
    let probe = StubProbe::none_healthy();
    let hw = HardwareProfile::gpu(CudaVersion::new(12, 2));

    let err = resolve(&candidates, &hw, &bring_up, &probe, &fast_options())
        .await
        .unwrap_err();

    let ledger = err.ledger().expect("expected Exhausted");
    assert_eq!(ledger.len(), 3);
    for failure in ledger {
        assert!(matches!(failure.reason, FailureReason::RuntimeTooOld { .. }));
    }
    assert!(probe.calls().is_empty());
    assert!(bring_up.calls().is_empty());

    // The human-readable form names every candidate and its reason.
    let msg = err.to_string();
    for image in ["img:needs-12.8", "img:needs-12.9", "img:needs-13.0"] {
        assert!(msg.contains(image), "missing {image} in: {msg}");
    }
    assert!(msg.contains("requires CUDA"), "got: {msg}");
}

#[tokio::test]
async fn bring_up_failure_is_recorded_and_skipped_past() {
    let candidates = vec![
        candidate("img:bad-bringup", "12.1"),
        candidate("img:good", "12.1"),
    ];
    let bring_up = StubBringUp::rejecting(["img:bad-bringup"]);
    let probe = StubProbe::healthy(["img:good"]);
    let hw = HardwareProfile::gpu(CudaVersion::new(12, 2));

    let endpoint = resolve(&candidates, &hw, &bring_up, &probe, &fast_options())
        .await
        .unwrap();

    assert_eq!(endpoint.image, "img:good");
    // The failing candidate was never probed — bring-up is a fast-fail.
    assert_eq!(probe.calls_for("img:bad-bringup"), 0);
    assert_eq!(bring_up.calls(), vec!["img:bad-bringup", "img:good"]);
}

#[tokio::test]
async fn mixed_failures_keep_one_ledger_entry_per_candidate() {
    let candidates = vec![
        candidate("img:too-new", "12.9"),
        candidate("img:bad-bringup", "12.1"),
        candidate("img:never-healthy", "12.1"),
        candidate("img:text-only", "12.1").multimodal(false),
    ];
    let bring_up = StubBringUp::rejecting(["img:bad-bringup"]);
    let probe = StubProbe::none_healthy();
    let hw = HardwareProfile::gpu(CudaVersion::new(12, 2));

    let err = resolve(&candidates, &hw, &bring_up, &probe, &fast_options())
        .await
        .unwrap_err();

    let ledger = err.ledger().expect("expected Exhausted");
    assert_eq!(ledger.len(), 4);

    let reason_for = |image: &str| {
        &ledger
            .iter()
            .find(|f| f.candidate.contains(image))
            .unwrap_or_else(|| panic!("no ledger entry for {image}"))
            .reason
    };
    assert!(matches!(reason_for("img:too-new"), FailureReason::RuntimeTooOld { .. }));
    assert!(matches!(reason_for("img:bad-bringup"), FailureReason::BringUp(_)));
    assert!(matches!(
        reason_for("img:never-healthy"),
        FailureReason::ProbeExhausted { attempts: 3, .. }
    ));
    assert!(matches!(reason_for("img:text-only"), FailureReason::NotMultimodal));
}

#[tokio::test]
async fn cpu_host_defers_cpu_capable_candidates_instead_of_skipping() {
    let candidates = vec![
        candidate("img:gpu-only", "12.1"),
        candidate("img:cpu-fallback", "12.1").allow_cpu(true),
    ];
    let bring_up = StubBringUp::ok();
    let probe = StubProbe::healthy(["img:cpu-fallback"]);
    let hw = HardwareProfile::cpu();

    let endpoint = resolve(&candidates, &hw, &bring_up, &probe, &fast_options())
        .await
        .unwrap();

    assert_eq!(endpoint.image, "img:cpu-fallback");
    assert_eq!(probe.calls_for("img:gpu-only"), 0);
}

#[tokio::test]
async fn probe_retries_then_succeeds_within_budget() {
    let candidates = vec![candidate("img:slow-start", "12.1")];
    let bring_up = StubBringUp::ok();
    let probe = FlakyProbe {
        succeed_on: 3,
        calls: Mutex::new(0),
    };
    let hw = HardwareProfile::gpu(CudaVersion::new(12, 2));

    let endpoint = resolve(&candidates, &hw, &bring_up, &probe, &fast_options())
        .await
        .unwrap();

    assert_eq!(endpoint.image, "img:slow-start");
    assert_eq!(*probe.calls.lock().unwrap(), 3);
}

#[tokio::test]
async fn invalid_base_url_is_fatal_before_any_bring_up() {
    let candidates = vec![
        candidate("img:fine", "12.1"),
        candidate("img:bad-url", "12.1").base_url("localhost:8888/v1"),
    ];
    let bring_up = StubBringUp::ok();
    let probe = StubProbe::healthy(["img:fine"]);
    let hw = HardwareProfile::gpu(CudaVersion::new(12, 2));

    let err = resolve(&candidates, &hw, &bring_up, &probe, &fast_options())
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::InvalidEndpoint { .. }));
    assert!(bring_up.calls().is_empty());
}

#[tokio::test]
async fn model_swap_is_just_another_candidate() {
    // The Qwen3-VL → Qwen2.5-VL fallback: same image, different model.
    let candidates = vec![
        DeploymentCandidate::new(
            "vllm/vllm-openai:v0.7.0",
            "Qwen/Qwen3-VL-8B-Instruct",
            "12.2".parse().unwrap(),
        ),
        DeploymentCandidate::new(
            "vllm/vllm-openai:v0.7.0",
            "Qwen/Qwen2.5-VL-7B-Instruct",
            "12.2".parse().unwrap(),
        ),
    ];
    let bring_up = StubBringUp::ok();
    // Both candidates share the image, so the probe reports healthy for
    // either; first-wins must select on position, carrying the first model.
    let probe = StubProbe::healthy(["vllm/vllm-openai:v0.7.0"]);
    let hw = HardwareProfile::gpu(CudaVersion::new(12, 2));

    let endpoint = resolve(&candidates, &hw, &bring_up, &probe, &fast_options())
        .await
        .unwrap();

    assert_eq!(endpoint.model, "Qwen/Qwen3-VL-8B-Instruct");
    assert_eq!(probe.calls().len(), 1);
}
