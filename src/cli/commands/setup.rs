//! Setup command implementation.
//!
//! Walks the operator through the one-time gcloud and Docker configuration
//! a registry push needs.

use tokio::process::Command;

use crate::cli::commands::EXIT_COMPLETED;
use crate::cli::{OutputManager, SetupArgs};
use crate::error::{CliError, ReleaseError, Result};

/// Execute the setup command and return the process exit code.
pub(super) async fn execute_setup(args: &SetupArgs, output: &OutputManager) -> Result<i32> {
    which::which("gcloud").map_err(|_| {
        ReleaseError::Cli(CliError::ExecutionFailed {
            command: "gcloud".to_string(),
            reason: "not found on PATH; install the Google Cloud SDK first".to_string(),
        })
    })?;

    output.section("☁️  Registry setup");

    if args.skip_login {
        output.verbose_println("Skipping gcloud auth login");
    } else {
        output.progress("Signing in to gcloud");
        run_interactive("gcloud", &["auth", "login"]).await?;
    }

    if let Some(project) = &args.project {
        output.progress(&format!("Selecting project {project}"));
        run_interactive("gcloud", &["config", "set", "project", project]).await?;
    }

    output.progress("Enabling the Artifact Registry API");
    run_interactive(
        "gcloud",
        &["services", "enable", "artifactregistry.googleapis.com"],
    )
    .await?;

    output.progress(&format!(
        "Registering Docker credential helper for {}",
        args.registry_host
    ));
    run_interactive(
        "gcloud",
        &["auth", "configure-docker", &args.registry_host, "--quiet"],
    )
    .await?;

    output.success("Setup complete. Try: imageship doctor");
    Ok(EXIT_COMPLETED)
}

/// Run a command with inherited stdio so gcloud can prompt the operator.
async fn run_interactive(program: &str, cli_args: &[&str]) -> Result<()> {
    let rendered = format!("{program} {}", cli_args.join(" "));
    log::debug!("running: {rendered}");

    let status = Command::new(program)
        .args(cli_args)
        .status()
        .await
        .map_err(|e| {
            ReleaseError::Cli(CliError::ExecutionFailed {
                command: rendered.clone(),
                reason: e.to_string(),
            })
        })?;

    if !status.success() {
        return Err(ReleaseError::Cli(CliError::ExecutionFailed {
            command: rendered,
            reason: format!("exited with {}", status.code().unwrap_or(-1)),
        }));
    }
    Ok(())
}
