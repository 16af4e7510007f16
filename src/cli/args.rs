//! Command line argument parsing and validation.
//!
//! One release is one invocation: point the tool at a project, repository,
//! image, and version, and it builds, tags, pushes, and verifies.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Release container images to cloud artifact registries
#[derive(Parser, Debug)]
#[command(
    name = "imageship",
    version,
    about = "Release container images to cloud artifact registries",
    long_about = "Build, tag, push, and verify a container image release in one command.

Usage:
  imageship release --project acme-prod --repository backend --image api-server --version 1.4.2
  imageship doctor --dockerfile-path Dockerfile
  imageship setup --project acme-prod"
)]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Show verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Suppress all non-error output
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Top-level subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build, tag, push, and verify one image release
    Release(ReleaseArgs),
    /// Check local tooling and inputs without touching the registry
    Doctor(DoctorArgs),
    /// Configure gcloud and Docker for the target registry
    Setup(SetupArgs),
}

impl Command {
    /// Subcommand name for log and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Command::Release(_) => "release",
            Command::Doctor(_) => "doctor",
            Command::Setup(_) => "setup",
        }
    }
}

/// Arguments for the release subcommand
#[derive(clap::Args, Debug)]
pub struct ReleaseArgs {
    /// Cloud project id
    #[arg(long, env = "IMAGESHIP_PROJECT")]
    pub project: String,

    /// Artifact repository within the project
    #[arg(long, env = "IMAGESHIP_REPOSITORY")]
    pub repository: String,

    /// Image name within the repository
    #[arg(long, env = "IMAGESHIP_IMAGE")]
    pub image: String,

    /// Release version; becomes the image tag
    #[arg(long)]
    pub version: String,

    /// Registry host
    #[arg(
        long,
        env = "IMAGESHIP_REGISTRY_HOST",
        default_value = "europe-west1-docker.pkg.dev"
    )]
    pub registry_host: String,

    /// Path to the build manifest
    #[arg(long, default_value = "Dockerfile", value_name = "PATH")]
    pub dockerfile_path: PathBuf,

    /// Build context directory
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub context_dir: PathBuf,

    /// Credential source for registry authentication
    #[arg(long, value_enum, default_value_t = CredentialKind::Gcloud)]
    pub credentials: CredentialKind,

    /// Service-account key file, required with --credentials key-file
    #[arg(long, value_name = "PATH", required_if_eq("credentials", "key-file"))]
    pub key_file: Option<PathBuf>,

    /// Max total push attempts (overrides IMAGESHIP_RETRY_PUSH)
    #[arg(long, value_name = "N")]
    pub push_retries: Option<u32>,

    /// Max total verification attempts (overrides IMAGESHIP_RETRY_VERIFY)
    #[arg(long, value_name = "N")]
    pub verify_retries: Option<u32>,

    /// Build timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub build_timeout: Option<u64>,

    /// Push timeout in seconds, covering all attempts
    #[arg(long, value_name = "SECS")]
    pub push_timeout: Option<u64>,

    /// Skip post-push verification
    #[arg(long)]
    pub skip_verify: bool,

    /// Print the run record as JSON when the run ends
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the doctor subcommand
#[derive(clap::Args, Debug)]
pub struct DoctorArgs {
    /// Also check this build manifest
    #[arg(long, value_name = "PATH")]
    pub dockerfile_path: Option<PathBuf>,

    /// Also check this build context directory
    #[arg(long, value_name = "DIR")]
    pub context_dir: Option<PathBuf>,

    /// Print check results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the setup subcommand
#[derive(clap::Args, Debug)]
pub struct SetupArgs {
    /// Registry host to configure the Docker credential helper for
    #[arg(
        long,
        env = "IMAGESHIP_REGISTRY_HOST",
        default_value = "europe-west1-docker.pkg.dev"
    )]
    pub registry_host: String,

    /// Cloud project to select as the gcloud default
    #[arg(long, value_name = "PROJECT")]
    pub project: Option<String>,

    /// Skip the interactive gcloud login step
    #[arg(long)]
    pub skip_login: bool,
}

/// Where the release command sources its registry credentials
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Use the operator's active gcloud session
    Gcloud,
    /// Activate a service-account key file
    KeyFile,
    /// Read a pre-issued token from IMAGESHIP_AUTH_TOKEN
    Env,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if let Command::Release(release) = &self.command {
            if release.version.trim().is_empty() {
                return Err("Version is required".to_string());
            }
            if release.push_retries == Some(0) {
                return Err("--push-retries must be at least 1".to_string());
            }
            if release.verify_retries == Some(0) {
                return Err("--verify-retries must be at least 1".to_string());
            }
        }

        Ok(())
    }
}
