//! The release orchestrator.
//!
//! Owns the step ordering and failure semantics: authentication failures
//! surface immediately, build and tag failures are fatal, push retries
//! transient errors up to its bound, and verification is advisory. Every
//! step runs under a timeout; an elapsed timeout cancels the run with the
//! step it interrupted.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use crate::ReleaseConfig;
use crate::auth::Authenticator;
use crate::cli::OutputManager;
use crate::docker::ContainerEngine;
use crate::error::{CancelledError, IntegrityError, ReleaseError, Result};
use crate::pipeline::retry::retry_with_backoff;
use crate::pipeline::run::ReleaseRun;
use crate::pipeline::step::StepKind;
use crate::reference::ImageReference;
use crate::registry::RegistryCatalog;

/// Everything one release needs: the validated target plus build inputs.
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    /// Fully qualified target reference
    pub reference: ImageReference,
    /// Path to the build manifest
    pub manifest: PathBuf,
    /// Build context directory
    pub context_dir: PathBuf,
}

/// Final state of a release: the run record plus the typed result.
///
/// The record is returned even on failure so callers can inspect attempt
/// counts and per-step errors.
#[derive(Debug)]
pub struct ReleaseOutcome {
    /// Run record with per-step detail
    pub run: ReleaseRun,
    /// `Ok` when the run completed, the fatal error otherwise
    pub result: Result<()>,
}

/// Drives the five-step release pipeline against pluggable collaborators.
pub struct ReleaseOrchestrator<A, E, C> {
    authenticator: A,
    engine: E,
    catalog: C,
    config: ReleaseConfig,
    output: OutputManager,
}

impl<A, E, C> ReleaseOrchestrator<A, E, C>
where
    A: Authenticator,
    E: ContainerEngine,
    C: RegistryCatalog,
{
    /// Create an orchestrator from its collaborators.
    pub fn new(
        authenticator: A,
        engine: E,
        catalog: C,
        config: ReleaseConfig,
        output: OutputManager,
    ) -> Self {
        Self {
            authenticator,
            engine,
            catalog,
            config,
            output,
        }
    }

    /// Run the pipeline for `request` to a terminal state.
    pub async fn execute(&self, request: &ReleaseRequest) -> ReleaseOutcome {
        let mut run = ReleaseRun::new(&request.reference);
        self.output
            .section(&format!("🚀 Releasing {}", request.reference));
        log::info!("starting run {}", run.run_id);

        // Authenticate. Failures are user-facing and never retried.
        run.begin_step(StepKind::Authenticate);
        run.step_mut(StepKind::Authenticate).record_attempt();
        self.output.progress("Authenticating with registry");
        let token = match self
            .bounded(StepKind::Authenticate, self.config.auth_timeout, async {
                self.authenticator
                    .authenticate()
                    .await
                    .map_err(ReleaseError::from)
            })
            .await
        {
            Ok(token) => token,
            Err(e) => return self.fail(run, StepKind::Authenticate, e),
        };
        run.finish_step(StepKind::Authenticate);
        self.output.success("Authenticated");

        // Build. Deterministic enough to re-run, so never retried here.
        run.begin_step(StepKind::Build);
        run.step_mut(StepKind::Build).record_attempt();
        let built = match self
            .bounded(StepKind::Build, self.config.build_timeout, async {
                self.engine
                    .build(&request.manifest, &request.context_dir, &request.reference)
                    .await
                    .map_err(ReleaseError::from)
            })
            .await
        {
            Ok(digest) => digest,
            Err(e) => return self.fail(run, StepKind::Build, e),
        };
        run.built_digest = Some(built.clone());

        // Tag. The engine makes this a no-op when already applied.
        run.begin_step(StepKind::Tag);
        run.step_mut(StepKind::Tag).record_attempt();
        if let Err(e) = self
            .bounded(StepKind::Tag, self.config.tag_timeout, async {
                self.engine
                    .tag(&built, &request.reference)
                    .await
                    .map_err(ReleaseError::from)
            })
            .await
        {
            return self.fail(run, StepKind::Tag, e);
        }
        run.finish_step(StepKind::Tag);

        // Push, retrying transient failures up to the configured bound.
        run.begin_step(StepKind::Push);
        let push_result = {
            let step = run.step_mut(StepKind::Push);
            self.bounded(
                StepKind::Push,
                self.config.push_timeout,
                retry_with_backoff(
                    || async {
                        self.engine
                            .push(&request.reference, &token)
                            .await
                            .map_err(ReleaseError::from)
                    },
                    self.config.push_retry_limit,
                    self.config.backoff_base,
                    "Push",
                    &self.output,
                    step,
                ),
            )
            .await
        };
        let remote = match push_result {
            Ok(remote) => remote,
            Err(e) => return self.fail(run, StepKind::Push, e),
        };
        run.remote_digest = Some(remote.clone());

        // The registry must have stored exactly what the build produced.
        if remote != built {
            let err = ReleaseError::Integrity(IntegrityError {
                reference: request.reference.to_string(),
                expected: built.to_string(),
                actual: remote.to_string(),
            });
            return self.fail(run, StepKind::Push, err);
        }
        run.finish_step(StepKind::Push);
        self.output.success(&format!(
            "Pushed {} ({})",
            request.reference,
            remote.short()
        ));

        // Verify. Advisory only: a completed push stays completed.
        if self.config.skip_verify {
            self.output.verbose_println("Verification skipped");
        } else {
            run.begin_step(StepKind::Verify);
            let verify_result = {
                let step = run.step_mut(StepKind::Verify);
                self.bounded(
                    StepKind::Verify,
                    self.config.verify_timeout,
                    retry_with_backoff(
                        || async {
                            self.catalog
                                .describe(&request.reference, &token)
                                .await
                                .map_err(ReleaseError::from)
                        },
                        self.config.verify_retry_limit,
                        self.config.backoff_base,
                        "Verify",
                        &self.output,
                        step,
                    ),
                )
                .await
            };

            match verify_result {
                Ok(metadata) if metadata.digest == remote => {
                    run.finish_step(StepKind::Verify);
                    self.output
                        .success(&format!("Verified {} in registry", request.reference));
                }
                Ok(metadata) => {
                    let warning = format!(
                        "registry lists digest {} but the push reported {}",
                        metadata.digest, remote
                    );
                    self.record_verify_warning(&mut run, warning);
                }
                Err(e) => {
                    let warning = format!("could not confirm the registry listing: {e}");
                    self.record_verify_warning(&mut run, warning);
                }
            }
        }

        run.complete();
        log::info!(
            "run {} completed after {} total attempts",
            run.run_id,
            run.total_attempts()
        );
        ReleaseOutcome {
            run,
            result: Ok(()),
        }
    }

    /// Cap `operation` at `limit`; an elapsed timeout cancels the step.
    async fn bounded<T>(
        &self,
        step: StepKind,
        limit: Duration,
        operation: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(limit, operation).await {
            Ok(result) => result,
            Err(_) => Err(ReleaseError::Cancelled(CancelledError {
                step,
                timeout: limit,
            })),
        }
    }

    fn record_verify_warning(&self, run: &mut ReleaseRun, warning: String) {
        self.output.warn(&format!(
            "⚠️  Verification inconclusive: {warning}. The push itself succeeded; check the registry manually."
        ));
        run.step_mut(StepKind::Verify).mark_failed(&warning);
        run.verify_warning = Some(warning);
    }

    fn fail(&self, mut run: ReleaseRun, step: StepKind, error: ReleaseError) -> ReleaseOutcome {
        run.fail(step, &error.to_string());
        log::warn!("run {} failed at {step}: {error}", run.run_id);
        self.output.error(&format!("❌ {step} failed: {error}"));
        ReleaseOutcome {
            run,
            result: Err(error),
        }
    }
}
