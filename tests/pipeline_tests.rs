//! End-to-end pipeline tests against scripted fakes.
//!
//! The fakes stand in for gcloud, the docker daemon, and the registry so
//! the orchestrator's ordering, retry, and failure semantics can be
//! exercised without any external tooling.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use imageship::auth::{AuthToken, Authenticator};
use imageship::cli::OutputManager;
use imageship::docker::ContainerEngine;
use imageship::error::{
    AuthError, BuildError, PermanentPushError, PushError, ReferenceError, ReleaseError, TagError,
    TransientPushError, VerifyError,
};
use imageship::pipeline::{
    ReleaseOrchestrator, ReleaseOutcome, ReleaseRequest, RunPhase, StepKind, StepStatus,
};
use imageship::registry::{ImageMetadata, RegistryCatalog};
use imageship::{ImageDigest, ImageReference, ReleaseConfig};

fn digest(fill: char) -> ImageDigest {
    let hex: String = std::iter::repeat(fill).take(64).collect();
    ImageDigest::parse(&format!("sha256:{hex}")).unwrap()
}

fn reference() -> ImageReference {
    ImageReference::new(
        "europe-west1-docker.pkg.dev",
        "acme-prod",
        "backend",
        "api-server",
        "1.4.2",
    )
    .unwrap()
}

fn request() -> ReleaseRequest {
    ReleaseRequest {
        reference: reference(),
        manifest: PathBuf::from("Dockerfile"),
        context_dir: PathBuf::from("."),
    }
}

fn fast_config() -> ReleaseConfig {
    ReleaseConfig {
        backoff_base: Duration::from_millis(1),
        ..ReleaseConfig::default()
    }
}

fn quiet_output() -> OutputManager {
    OutputManager::new(false, true)
}

struct FakeAuthenticator {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl FakeAuthenticator {
    fn ok(calls: &Arc<AtomicUsize>) -> Self {
        Self {
            calls: calls.clone(),
            fail: false,
        }
    }

    fn failing(calls: &Arc<AtomicUsize>) -> Self {
        Self {
            calls: calls.clone(),
            fail: true,
        }
    }
}

impl Authenticator for FakeAuthenticator {
    async fn authenticate(&self) -> Result<AuthToken, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(AuthError::MissingCredentials {
                reason: "no active account".to_string(),
            })
        } else {
            Ok(AuthToken::new("ya29.test-token"))
        }
    }
}

/// Scripted engine: each push pops the next scripted result.
struct FakeEngine {
    build_calls: Arc<AtomicUsize>,
    push_calls: Arc<AtomicUsize>,
    built: ImageDigest,
    build_delay: Option<Duration>,
    tag_result: Mutex<Option<TagError>>,
    push_results: Mutex<VecDeque<Result<ImageDigest, PushError>>>,
}

struct Counters {
    auth: Arc<AtomicUsize>,
    build: Arc<AtomicUsize>,
    push: Arc<AtomicUsize>,
    verify: Arc<AtomicUsize>,
}

impl Counters {
    fn new() -> Self {
        Self {
            auth: Arc::new(AtomicUsize::new(0)),
            build: Arc::new(AtomicUsize::new(0)),
            push: Arc::new(AtomicUsize::new(0)),
            verify: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FakeEngine {
    fn new(
        counters: &Counters,
        built: ImageDigest,
        push_results: Vec<Result<ImageDigest, PushError>>,
    ) -> Self {
        Self {
            build_calls: counters.build.clone(),
            push_calls: counters.push.clone(),
            built,
            build_delay: None,
            tag_result: Mutex::new(None),
            push_results: Mutex::new(push_results.into()),
        }
    }

    fn with_tag_error(self, error: TagError) -> Self {
        *self.tag_result.lock().unwrap() = Some(error);
        self
    }

    fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = Some(delay);
        self
    }
}

impl ContainerEngine for FakeEngine {
    async fn build(
        &self,
        _manifest: &Path,
        _context: &Path,
        _reference: &ImageReference,
    ) -> Result<ImageDigest, BuildError> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.built.clone())
    }

    async fn tag(
        &self,
        _digest: &ImageDigest,
        _reference: &ImageReference,
    ) -> Result<(), TagError> {
        match self.tag_result.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn push(
        &self,
        _reference: &ImageReference,
        _token: &AuthToken,
    ) -> Result<ImageDigest, PushError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.push_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("push called more times than scripted"))
    }
}

struct FakeCatalog {
    calls: Arc<AtomicUsize>,
    results: Mutex<VecDeque<Result<ImageMetadata, VerifyError>>>,
}

impl FakeCatalog {
    fn new(counters: &Counters, results: Vec<Result<ImageMetadata, VerifyError>>) -> Self {
        Self {
            calls: counters.verify.clone(),
            results: Mutex::new(results.into()),
        }
    }

    fn listing(counters: &Counters, digest: &ImageDigest) -> Self {
        Self::new(counters, vec![Ok(metadata(digest))])
    }
}

fn metadata(digest: &ImageDigest) -> ImageMetadata {
    ImageMetadata {
        digest: digest.clone(),
        media_type: Some("application/vnd.oci.image.manifest.v1+json".to_string()),
        size_bytes: Some(1428),
    }
}

impl RegistryCatalog for FakeCatalog {
    async fn describe(
        &self,
        _reference: &ImageReference,
        _token: &AuthToken,
    ) -> Result<ImageMetadata, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("describe called more times than scripted"))
    }
}

async fn run_release(
    authenticator: FakeAuthenticator,
    engine: FakeEngine,
    catalog: FakeCatalog,
    config: ReleaseConfig,
) -> ReleaseOutcome {
    let orchestrator =
        ReleaseOrchestrator::new(authenticator, engine, catalog, config, quiet_output());
    orchestrator.execute(&request()).await
}

fn unavailable() -> PushError {
    PushError::Transient(TransientPushError::RegistryUnavailable {
        status: 503,
        reason: "upstream maintenance".to_string(),
    })
}

#[tokio::test]
async fn happy_path_completes_with_matching_digests() {
    let counters = Counters::new();
    let built = digest('a');
    let outcome = run_release(
        FakeAuthenticator::ok(&counters.auth),
        FakeEngine::new(&counters, built.clone(), vec![Ok(built.clone())]),
        FakeCatalog::listing(&counters, &built),
        fast_config(),
    )
    .await;

    assert!(outcome.result.is_ok());
    assert!(outcome.run.succeeded());
    assert_eq!(outcome.run.built_digest, Some(built.clone()));
    assert_eq!(outcome.run.remote_digest, Some(built));
    assert!(
        outcome
            .run
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Succeeded)
    );
    assert_eq!(outcome.run.step(StepKind::Push).attempt_count, 1);
    assert!(outcome.run.verify_warning.is_none());
}

#[tokio::test]
async fn rerunning_an_identical_release_completes_again() {
    let built = digest('a');
    for _ in 0..2 {
        let counters = Counters::new();
        let outcome = run_release(
            FakeAuthenticator::ok(&counters.auth),
            FakeEngine::new(&counters, built.clone(), vec![Ok(built.clone())]),
            FakeCatalog::listing(&counters, &built),
            fast_config(),
        )
        .await;
        assert!(outcome.run.succeeded());
    }
}

#[tokio::test]
async fn auth_failure_stops_before_any_build() {
    let counters = Counters::new();
    let built = digest('a');
    let outcome = run_release(
        FakeAuthenticator::failing(&counters.auth),
        FakeEngine::new(&counters, built.clone(), vec![]),
        FakeCatalog::new(&counters, vec![]),
        fast_config(),
    )
    .await;

    assert_eq!(outcome.run.phase, RunPhase::Failed(StepKind::Authenticate));
    assert!(matches!(outcome.result, Err(ReleaseError::Auth(_))));
    assert_eq!(counters.auth.load(Ordering::SeqCst), 1);
    assert_eq!(counters.build.load(Ordering::SeqCst), 0);
    assert_eq!(counters.push.load(Ordering::SeqCst), 0);
    assert_eq!(
        outcome.run.step(StepKind::Authenticate).attempt_count,
        1,
        "authentication is never retried"
    );
}

#[tokio::test]
async fn transient_push_failures_exhaust_the_attempt_bound() {
    let counters = Counters::new();
    let built = digest('a');
    let outcome = run_release(
        FakeAuthenticator::ok(&counters.auth),
        FakeEngine::new(
            &counters,
            built.clone(),
            vec![Err(unavailable()), Err(unavailable()), Err(unavailable())],
        ),
        FakeCatalog::new(&counters, vec![]),
        fast_config(),
    )
    .await;

    assert_eq!(outcome.run.phase, RunPhase::Failed(StepKind::Push));
    assert_eq!(counters.push.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.run.step(StepKind::Push).attempt_count, 3);
    assert!(matches!(
        outcome.result,
        Err(ReleaseError::Push(PushError::Transient(_)))
    ));
    assert_eq!(counters.verify.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn push_recovers_within_the_attempt_bound() {
    let counters = Counters::new();
    let built = digest('a');
    let outcome = run_release(
        FakeAuthenticator::ok(&counters.auth),
        FakeEngine::new(
            &counters,
            built.clone(),
            vec![Err(unavailable()), Err(unavailable()), Ok(built.clone())],
        ),
        FakeCatalog::listing(&counters, &built),
        fast_config(),
    )
    .await;

    assert!(outcome.run.succeeded());
    assert_eq!(outcome.run.step(StepKind::Push).attempt_count, 3);
    assert_eq!(outcome.run.step(StepKind::Push).status, StepStatus::Succeeded);
}

#[tokio::test]
async fn permanent_push_error_is_not_retried() {
    let counters = Counters::new();
    let built = digest('a');
    let outcome = run_release(
        FakeAuthenticator::ok(&counters.auth),
        FakeEngine::new(
            &counters,
            built.clone(),
            vec![Err(PushError::Permanent(PermanentPushError::Rejected {
                reason: "manifest invalid".to_string(),
            }))],
        ),
        FakeCatalog::new(&counters, vec![]),
        fast_config(),
    )
    .await;

    assert_eq!(outcome.run.phase, RunPhase::Failed(StepKind::Push));
    assert_eq!(counters.push.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.run.step(StepKind::Push).attempt_count, 1);
}

#[tokio::test]
async fn conflicting_registry_digest_fails_the_push_step() {
    let counters = Counters::new();
    let built = digest('a');
    let conflicting = digest('b');
    let outcome = run_release(
        FakeAuthenticator::ok(&counters.auth),
        FakeEngine::new(&counters, built.clone(), vec![Ok(conflicting.clone())]),
        FakeCatalog::new(&counters, vec![]),
        fast_config(),
    )
    .await;

    assert_eq!(outcome.run.phase, RunPhase::Failed(StepKind::Push));
    assert!(matches!(outcome.result, Err(ReleaseError::Integrity(_))));
    assert_eq!(outcome.run.built_digest, Some(built));
    assert_eq!(outcome.run.remote_digest, Some(conflicting));
    assert_eq!(counters.verify.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn verification_failure_never_fails_a_completed_push() {
    let counters = Counters::new();
    let built = digest('a');
    let outcome = run_release(
        FakeAuthenticator::ok(&counters.auth),
        FakeEngine::new(&counters, built.clone(), vec![Ok(built.clone())]),
        FakeCatalog::new(
            &counters,
            vec![
                Err(VerifyError::Unavailable { status: 503 }),
                Err(VerifyError::Unavailable { status: 503 }),
            ],
        ),
        fast_config(),
    )
    .await;

    assert!(outcome.result.is_ok());
    assert!(outcome.run.succeeded());
    assert_eq!(outcome.run.step(StepKind::Verify).status, StepStatus::Failed);
    assert_eq!(outcome.run.step(StepKind::Verify).attempt_count, 2);
    assert!(outcome.run.verify_warning.is_some());
}

#[tokio::test]
async fn verification_digest_mismatch_is_reported_as_a_warning() {
    let counters = Counters::new();
    let built = digest('a');
    let listed = digest('c');
    let outcome = run_release(
        FakeAuthenticator::ok(&counters.auth),
        FakeEngine::new(&counters, built.clone(), vec![Ok(built.clone())]),
        FakeCatalog::new(&counters, vec![Ok(metadata(&listed))]),
        fast_config(),
    )
    .await;

    assert!(outcome.run.succeeded());
    let warning = outcome.run.verify_warning.expect("warning recorded");
    assert!(warning.contains("registry lists digest"));
}

#[tokio::test]
async fn skip_verify_leaves_the_verify_step_untouched() {
    let counters = Counters::new();
    let built = digest('a');
    let outcome = run_release(
        FakeAuthenticator::ok(&counters.auth),
        FakeEngine::new(&counters, built.clone(), vec![Ok(built.clone())]),
        FakeCatalog::new(&counters, vec![]),
        ReleaseConfig {
            skip_verify: true,
            ..fast_config()
        },
    )
    .await;

    assert!(outcome.run.succeeded());
    assert_eq!(counters.verify.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.run.step(StepKind::Verify).status, StepStatus::Pending);
}

#[tokio::test]
async fn evicted_artifact_fails_the_tag_step() {
    let counters = Counters::new();
    let built = digest('a');
    let engine = FakeEngine::new(&counters, built.clone(), vec![]).with_tag_error(
        TagError::ArtifactEvicted {
            digest: built.to_string(),
            reference: reference().to_string(),
        },
    );
    let outcome = run_release(
        FakeAuthenticator::ok(&counters.auth),
        engine,
        FakeCatalog::new(&counters, vec![]),
        fast_config(),
    )
    .await;

    assert_eq!(outcome.run.phase, RunPhase::Failed(StepKind::Tag));
    assert!(matches!(
        outcome.result,
        Err(ReleaseError::Tag(TagError::ArtifactEvicted { .. }))
    ));
    assert_eq!(counters.push.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_build_is_cancelled_at_the_step_timeout() {
    let counters = Counters::new();
    let built = digest('a');
    let engine = FakeEngine::new(&counters, built.clone(), vec![])
        .with_build_delay(Duration::from_secs(5));
    let outcome = run_release(
        FakeAuthenticator::ok(&counters.auth),
        engine,
        FakeCatalog::new(&counters, vec![]),
        ReleaseConfig {
            build_timeout: Duration::from_millis(50),
            ..fast_config()
        },
    )
    .await;

    assert_eq!(outcome.run.phase, RunPhase::Failed(StepKind::Build));
    match outcome.result {
        Err(ReleaseError::Cancelled(cancelled)) => {
            assert_eq!(cancelled.step, StepKind::Build);
        }
        other => panic!("expected a cancellation, got {other:?}"),
    }
}

#[test]
fn invalid_targets_are_rejected_before_any_step_runs() {
    let err = ImageReference::new(
        "europe-west1-docker.pkg.dev",
        "acme-prod",
        "backend",
        "api-server",
        "",
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ReferenceError::EmptyComponent { component: "version" }
    ));

    let err = ImageReference::new("", "acme-prod", "backend", "api-server", "1.0.0").unwrap_err();
    assert!(matches!(err, ReferenceError::EmptyComponent { .. }));
}
