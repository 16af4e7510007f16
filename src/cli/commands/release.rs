//! Release command implementation.
//!
//! Builds the validated request, assembles the production collaborators,
//! runs the pipeline, and maps the terminal run state to an exit code.

use std::time::Duration;

use crate::ReleaseConfig;
use crate::auth::{AuthToken, CredentialSource, GcloudAuthenticator};
use crate::cli::commands::{
    EXIT_AUTH_FAILED, EXIT_BUILD_FAILED, EXIT_COMPLETED, EXIT_FAILURE, EXIT_PUSH_FAILED,
    EXIT_TAG_FAILED, EXIT_VALIDATION,
};
use crate::cli::{CredentialKind, OutputManager, ReleaseArgs, RetryConfig};
use crate::docker::DockerEngine;
use crate::error::{CliError, ReleaseError, Result};
use crate::pipeline::{
    ReleaseOrchestrator, ReleaseOutcome, ReleaseRequest, RunPhase, StepKind, StepStatus,
};
use crate::reference::ImageReference;
use crate::registry::HttpRegistryCatalog;

/// Execute the release command and return the process exit code.
pub(super) async fn execute_release(args: &ReleaseArgs, output: &OutputManager) -> Result<i32> {
    // The target must validate before any external call is made.
    let reference = match ImageReference::new(
        &args.registry_host,
        &args.project,
        &args.repository,
        &args.image,
        &args.version,
    ) {
        Ok(reference) => reference,
        Err(e) => {
            output.error(&format!("Invalid release target: {e}"));
            return Ok(EXIT_VALIDATION);
        }
    };

    let config = build_config(args)?;
    let source = credential_source(args)?;
    output.verbose_println(&format!("Credentials: {source}"));

    let authenticator = GcloudAuthenticator::new(source, &args.project);
    let engine = DockerEngine::new(output.clone());
    let catalog = HttpRegistryCatalog::new().map_err(|e| {
        ReleaseError::Cli(CliError::ExecutionFailed {
            command: "initialize registry client".to_string(),
            reason: e.to_string(),
        })
    })?;

    let request = ReleaseRequest {
        reference,
        manifest: args.dockerfile_path.clone(),
        context_dir: args.context_dir.clone(),
    };

    let orchestrator =
        ReleaseOrchestrator::new(authenticator, engine, catalog, config, output.clone());
    let outcome = orchestrator.execute(&request).await;

    print_summary(&outcome, args.json, output);
    Ok(exit_code(&outcome))
}

/// Merge defaults, environment knobs, and flags into the pipeline config.
fn build_config(args: &ReleaseArgs) -> Result<ReleaseConfig> {
    let retry = RetryConfig::from_env();
    retry
        .validate()
        .map_err(|reason| ReleaseError::Cli(CliError::InvalidArguments { reason }))?;

    let defaults = ReleaseConfig::default();
    Ok(ReleaseConfig {
        push_retry_limit: args.push_retries.unwrap_or(retry.push_attempts),
        verify_retry_limit: args.verify_retries.unwrap_or(retry.verify_attempts),
        backoff_base: Duration::from_secs(retry.backoff_base_secs),
        build_timeout: args
            .build_timeout
            .map(Duration::from_secs)
            .unwrap_or(defaults.build_timeout),
        push_timeout: args
            .push_timeout
            .map(Duration::from_secs)
            .unwrap_or(defaults.push_timeout),
        skip_verify: args.skip_verify,
        ..defaults
    })
}

fn credential_source(args: &ReleaseArgs) -> Result<CredentialSource> {
    match args.credentials {
        CredentialKind::Gcloud => Ok(CredentialSource::GcloudSession),
        CredentialKind::KeyFile => {
            let path = args.key_file.clone().ok_or_else(|| {
                ReleaseError::Cli(CliError::InvalidArguments {
                    reason: "--key-file is required with --credentials key-file".to_string(),
                })
            })?;
            Ok(CredentialSource::ServiceAccountKey(path))
        }
        CredentialKind::Env => {
            let token = std::env::var("IMAGESHIP_AUTH_TOKEN").map_err(|_| {
                ReleaseError::Cli(CliError::InvalidArguments {
                    reason: "IMAGESHIP_AUTH_TOKEN must be set with --credentials env".to_string(),
                })
            })?;
            Ok(CredentialSource::StaticToken(AuthToken::new(token)))
        }
    }
}

fn print_summary(outcome: &ReleaseOutcome, json: bool, output: &OutputManager) {
    let run = &outcome.run;

    if json {
        if let Ok(rendered) = serde_json::to_string_pretty(run) {
            output.emit(&rendered);
        }
        return;
    }

    output.section("📋 Release summary");
    for step in &run.steps {
        let line = match step.status {
            StepStatus::Succeeded => {
                format!("✓ {:<12} {} attempt(s)", step.kind.name(), step.attempt_count)
            }
            StepStatus::Failed => format!(
                "✗ {:<12} {}",
                step.kind.name(),
                step.last_error.as_deref().unwrap_or("failed")
            ),
            StepStatus::Pending => format!("- {:<12} not run", step.kind.name()),
            StepStatus::Running => format!("? {:<12} interrupted", step.kind.name()),
        };
        output.indent(&line);
    }
    if let Some(digest) = &run.remote_digest {
        output.indent(&format!("registry digest: {digest}"));
    }
    output.info(&run.summary());

    match run.phase {
        RunPhase::Completed if run.verify_warning.is_some() => {
            output.warn("🎉 Release completed, with verification warnings");
        }
        RunPhase::Completed => output.success("🎉 Release completed"),
        _ => {}
    }
}

/// Map the terminal run state to the process exit code.
fn exit_code(outcome: &ReleaseOutcome) -> i32 {
    match outcome.run.phase {
        // Verification never fails a completed push.
        RunPhase::Completed | RunPhase::Failed(StepKind::Verify) => EXIT_COMPLETED,
        RunPhase::Failed(StepKind::Authenticate) => EXIT_AUTH_FAILED,
        RunPhase::Failed(StepKind::Build) => EXIT_BUILD_FAILED,
        RunPhase::Failed(StepKind::Tag) => EXIT_TAG_FAILED,
        RunPhase::Failed(StepKind::Push) => EXIT_PUSH_FAILED,
        _ => EXIT_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ReleaseRun;

    fn outcome_with_phase(phase: RunPhase) -> ReleaseOutcome {
        let reference = ImageReference::new(
            "europe-west1-docker.pkg.dev",
            "acme-prod",
            "backend",
            "api-server",
            "1.4.2",
        )
        .unwrap();
        let mut run = ReleaseRun::new(&reference);
        run.set_phase(phase);
        ReleaseOutcome {
            run,
            result: Ok(()),
        }
    }

    #[test]
    fn exit_codes_follow_the_failed_step() {
        assert_eq!(exit_code(&outcome_with_phase(RunPhase::Completed)), 0);
        assert_eq!(
            exit_code(&outcome_with_phase(RunPhase::Failed(StepKind::Authenticate))),
            10
        );
        assert_eq!(
            exit_code(&outcome_with_phase(RunPhase::Failed(StepKind::Build))),
            11
        );
        assert_eq!(
            exit_code(&outcome_with_phase(RunPhase::Failed(StepKind::Tag))),
            12
        );
        assert_eq!(
            exit_code(&outcome_with_phase(RunPhase::Failed(StepKind::Push))),
            13
        );
    }

    #[test]
    fn flag_overrides_win_over_environment() {
        let args = ReleaseArgs {
            project: "acme-prod".to_string(),
            repository: "backend".to_string(),
            image: "api-server".to_string(),
            version: "1.4.2".to_string(),
            registry_host: "europe-west1-docker.pkg.dev".to_string(),
            dockerfile_path: "Dockerfile".into(),
            context_dir: ".".into(),
            credentials: CredentialKind::Gcloud,
            key_file: None,
            push_retries: Some(5),
            verify_retries: None,
            build_timeout: Some(120),
            push_timeout: None,
            skip_verify: true,
            json: false,
        };

        let config = build_config(&args).unwrap();
        assert_eq!(config.push_retry_limit, 5);
        assert_eq!(config.build_timeout, Duration::from_secs(120));
        assert!(config.skip_verify);
    }

    #[test]
    fn key_file_kind_requires_a_path() {
        let args = ReleaseArgs {
            project: "acme-prod".to_string(),
            repository: "backend".to_string(),
            image: "api-server".to_string(),
            version: "1.4.2".to_string(),
            registry_host: "europe-west1-docker.pkg.dev".to_string(),
            dockerfile_path: "Dockerfile".into(),
            context_dir: ".".into(),
            credentials: CredentialKind::KeyFile,
            key_file: None,
            push_retries: None,
            verify_retries: None,
            build_timeout: None,
            push_timeout: None,
            skip_verify: false,
            json: false,
        };

        let err = credential_source(&args).unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::Cli(CliError::InvalidArguments { .. })
        ));
    }
}
