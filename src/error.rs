//! Comprehensive error types for imageship operations.
//!
//! This module defines all error types with actionable error messages and recovery
//! suggestions. Push errors are split into transient and permanent families; the
//! retry loop only re-attempts the transient ones.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::StepKind;

/// Result type alias for imageship operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all imageship operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Image reference validation errors
    #[error("Reference error: {0}")]
    Reference(#[from] ReferenceError),

    /// Registry authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Image build errors
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Local tagging errors
    #[error("Tag error: {0}")]
    Tag(#[from] TagError),

    /// Registry push errors
    #[error("Push error: {0}")]
    Push(#[from] PushError),

    /// Built and pushed digests diverged
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Post-push verification errors
    #[error("Verify error: {0}")]
    Verify(#[from] VerifyError),

    /// Step cancelled by its timeout
    #[error(transparent)]
    Cancelled(#[from] CancelledError),

    /// CLI argument and helper command errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Image reference validation errors
#[derive(Error, Debug)]
pub enum ReferenceError {
    /// A required reference component is empty
    #[error("Reference component '{component}' must not be empty")]
    EmptyComponent {
        /// Component name
        component: &'static str,
    },

    /// A reference component contains characters the registry rejects
    #[error("Invalid {component} '{value}': {reason}")]
    InvalidComponent {
        /// Component name
        component: &'static str,
        /// Offending value
        value: String,
        /// Reason for the error
        reason: String,
    },

    /// Registry host is not a plausible hostname
    #[error("Invalid registry host '{host}': {reason}")]
    InvalidHost {
        /// Host string
        host: String,
        /// Reason for the error
        reason: String,
    },

    /// Version string is not a semantic version
    #[error("Invalid version '{version}': {source}")]
    InvalidVersion {
        /// Version string
        version: String,
        /// Parsing error
        #[source]
        source: semver::Error,
    },

    /// Digest string is malformed
    #[error("Invalid digest '{digest}': {reason}")]
    InvalidDigest {
        /// Digest string
        digest: String,
        /// Reason for the error
        reason: String,
    },

    /// Reference string could not be split into its components
    #[error("Invalid image reference '{reference}': {reason}")]
    Unparsable {
        /// Full reference string
        reference: String,
        /// Reason for the error
        reason: String,
    },
}

/// Registry authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Authentication tool not installed
    #[error("'{tool}' not found on PATH. Install the Google Cloud SDK first.")]
    ToolNotFound {
        /// Tool binary name
        tool: String,
    },

    /// No active credentials available
    #[error("No active credentials: {reason}")]
    MissingCredentials {
        /// Reason for the error
        reason: String,
    },

    /// Credentials exist but are no longer valid
    #[error("Credentials expired: {reason}")]
    ExpiredCredentials {
        /// Reason for the error
        reason: String,
    },

    /// Artifact Registry API is not enabled for the project
    #[error("Artifact Registry API is not enabled for project '{project}'")]
    ApiNotEnabled {
        /// Project id
        project: String,
    },

    /// Service-account key file could not be read
    #[error("Cannot read key file {path}: {reason}")]
    KeyFileUnreadable {
        /// Key file path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Token acquisition command failed
    #[error("Authentication command failed: {command} - {reason}")]
    CommandFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

/// Image build errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// Build tool not installed
    #[error("'{tool}' not found on PATH. Install Docker first.")]
    ToolNotFound {
        /// Tool binary name
        tool: String,
    },

    /// Container daemon is not reachable
    #[error("Container daemon unavailable: {reason}")]
    DaemonUnavailable {
        /// Reason for the error
        reason: String,
    },

    /// Build context directory does not exist
    #[error("Build context directory not found: {path}")]
    ContextMissing {
        /// Context directory path
        path: PathBuf,
    },

    /// Build manifest does not exist
    #[error("Build manifest not found: {path}")]
    ManifestMissing {
        /// Manifest path
        path: PathBuf,
    },

    /// Build manifest exists but could not be read
    #[error("Cannot read build manifest {path}: {reason}")]
    ManifestUnreadable {
        /// Manifest path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Build manifest declares no base image
    #[error("Build manifest {path} has no FROM instruction")]
    NoBaseImage {
        /// Manifest path
        path: PathBuf,
    },

    /// Build command failed
    #[error("Image build failed: {reason}")]
    BuildFailed {
        /// Reason reported by the build tool
        reason: String,
    },

    /// Build succeeded but produced no digest
    #[error("Build produced no digest: {reason}")]
    DigestUnavailable {
        /// Reason for the error
        reason: String,
    },
}

/// Local tagging errors
#[derive(Error, Debug)]
pub enum TagError {
    /// Built artifact no longer exists in the local cache
    #[error(
        "Built image {digest} was evicted from the local cache before tagging '{reference}'. Rebuild and release again."
    )]
    ArtifactEvicted {
        /// Digest of the missing artifact
        digest: String,
        /// Reference that was being applied
        reference: String,
    },

    /// Tag command failed
    #[error("Failed to tag '{reference}': {reason}")]
    TagFailed {
        /// Reference that was being applied
        reference: String,
        /// Reason for the error
        reason: String,
    },
}

/// Registry push errors, split by retry eligibility
#[derive(Error, Debug)]
pub enum PushError {
    /// Errors worth retrying
    #[error(transparent)]
    Transient(#[from] TransientPushError),

    /// Errors that repeat deterministically
    #[error(transparent)]
    Permanent(#[from] PermanentPushError),
}

impl PushError {
    /// Whether the retry loop may re-attempt after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, PushError::Transient(_))
    }
}

/// Push errors caused by transient network or registry conditions
#[derive(Error, Debug)]
pub enum TransientPushError {
    /// Connection dropped mid-transfer
    #[error("Connection reset during push: {reason}")]
    ConnectionReset {
        /// Reason for the error
        reason: String,
    },

    /// Registry answered with a server error
    #[error("Registry unavailable (HTTP {status}): {reason}")]
    RegistryUnavailable {
        /// HTTP status code, 0 when unknown
        status: u16,
        /// Reason for the error
        reason: String,
    },

    /// Network operation timed out
    #[error("Push timed out: {reason}")]
    TimedOut {
        /// Reason for the error
        reason: String,
    },
}

/// Push errors that will not succeed on retry
#[derive(Error, Debug)]
pub enum PermanentPushError {
    /// Registry rejected the credentials
    #[error("Registry rejected credentials (HTTP {status}): {reason}")]
    Unauthorized {
        /// HTTP status code, 0 when unknown
        status: u16,
        /// Reason for the error
        reason: String,
    },

    /// Repository refuses to overwrite an existing tag
    #[error("Tag '{reference}' is immutable in this repository. Release a new version instead.")]
    TagImmutable {
        /// Reference that was being pushed
        reference: String,
    },

    /// Push output carried no parsable digest
    #[error("Push output carried no digest: {output}")]
    DigestUnparsable {
        /// Captured push output
        output: String,
    },

    /// Registry rejected the push for another reason
    #[error("Registry rejected push: {reason}")]
    Rejected {
        /// Reason for the error
        reason: String,
    },
}

/// Digest reported by the registry does not match the built digest
#[derive(Error, Debug)]
#[error(
    "Registry reports digest {actual} for '{reference}' but the build produced {expected}. Another release may have replaced the tag mid-push."
)]
pub struct IntegrityError {
    /// Reference that was pushed
    pub reference: String,
    /// Digest produced by the build
    pub expected: String,
    /// Digest reported by the registry
    pub actual: String,
}

/// Post-push verification errors
#[derive(Error, Debug)]
pub enum VerifyError {
    /// Pushed reference is not yet listed by the registry
    #[error("Registry does not list '{reference}' yet")]
    NotFound {
        /// Reference that was queried
        reference: String,
    },

    /// Registry refused the verification request
    #[error("Registry denied verification request (HTTP {status})")]
    Denied {
        /// HTTP status code
        status: u16,
    },

    /// Registry answered with a server error
    #[error("Registry unavailable during verification (HTTP {status})")]
    Unavailable {
        /// HTTP status code
        status: u16,
    },

    /// Verification request failed before reaching the registry
    #[error("Verification request failed: {reason}")]
    Network {
        /// Reason for the error
        reason: String,
    },

    /// Registry listed the reference without a digest
    #[error("Registry listed '{reference}' without a digest header")]
    DigestMissing {
        /// Reference that was queried
        reference: String,
    },
}

impl VerifyError {
    /// Whether another verification attempt could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            // A fresh push may take a moment to become listable.
            VerifyError::NotFound { .. } => true,
            VerifyError::Unavailable { .. } => true,
            VerifyError::Network { .. } => true,
            VerifyError::Denied { .. } => false,
            VerifyError::DigestMissing { .. } => false,
        }
    }
}

/// A pipeline step exceeded its timeout and was cancelled
#[derive(Error, Debug)]
#[error("{step} step cancelled after {}s", .timeout.as_secs())]
pub struct CancelledError {
    /// Step that was cancelled
    pub step: StepKind,
    /// Timeout that elapsed
    pub timeout: Duration,
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Helper command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl ReleaseError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ReleaseError::Auth(AuthError::ToolNotFound { .. }) => vec![
                "Install the Google Cloud SDK: https://cloud.google.com/sdk/docs/install"
                    .to_string(),
                "Verify the install: gcloud --version".to_string(),
            ],
            ReleaseError::Auth(AuthError::MissingCredentials { .. }) => vec![
                "Log in interactively: gcloud auth login".to_string(),
                "Or run the guided setup: imageship setup".to_string(),
            ],
            ReleaseError::Auth(AuthError::ExpiredCredentials { .. }) => vec![
                "Refresh your session: gcloud auth login".to_string(),
                "For service accounts, re-activate the key: gcloud auth activate-service-account --key-file <path>".to_string(),
            ],
            ReleaseError::Auth(AuthError::ApiNotEnabled { project }) => vec![
                format!(
                    "Enable the API: gcloud services enable artifactregistry.googleapis.com --project {project}"
                ),
                "Confirm the project id is correct".to_string(),
            ],
            ReleaseError::Build(BuildError::ToolNotFound { .. }) => vec![
                "Install Docker: https://docs.docker.com/get-docker/".to_string(),
                "Verify the install: docker --version".to_string(),
            ],
            ReleaseError::Build(BuildError::DaemonUnavailable { .. }) => vec![
                "Start the Docker daemon and retry".to_string(),
                "Check daemon status: docker info".to_string(),
            ],
            ReleaseError::Push(PushError::Permanent(PermanentPushError::Unauthorized {
                ..
            })) => vec![
                "Confirm the account holds roles/artifactregistry.writer on the repository"
                    .to_string(),
                "Configure the Docker credential helper: gcloud auth configure-docker <registry-host>".to_string(),
            ],
            ReleaseError::Push(PushError::Permanent(PermanentPushError::TagImmutable {
                ..
            })) => vec![
                "Bump the release version and push a fresh tag".to_string(),
            ],
            ReleaseError::Integrity(_) => vec![
                "Check whether another release of the same version ran concurrently".to_string(),
                "Re-run the release to push the intended image again".to_string(),
            ],
            ReleaseError::Tag(TagError::ArtifactEvicted { .. }) => vec![
                "Re-run the release so the image is rebuilt".to_string(),
                "Raise the Docker image cache limits if eviction recurs".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Check if this error is transient and safe to retry
    pub fn is_transient(&self) -> bool {
        match self {
            ReleaseError::Push(e) => e.is_transient(),
            ReleaseError::Verify(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Pipeline step this error belongs to, when attributable
    pub fn step(&self) -> Option<StepKind> {
        match self {
            ReleaseError::Auth(_) => Some(StepKind::Authenticate),
            ReleaseError::Build(_) => Some(StepKind::Build),
            ReleaseError::Tag(_) => Some(StepKind::Tag),
            ReleaseError::Push(_) | ReleaseError::Integrity(_) => Some(StepKind::Push),
            ReleaseError::Verify(_) => Some(StepKind::Verify),
            ReleaseError::Cancelled(c) => Some(c.step),
            _ => None,
        }
    }
}
