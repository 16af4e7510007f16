//! # imageship
//!
//! Build, tag, push, and verify container images in cloud artifact registries.
//!
//! The crate wraps the `docker` and `gcloud` CLIs in a release pipeline that
//! validates the target reference up front, runs each step under its own
//! timeout, retries pushes on transient registry failures, and compares the
//! digest the registry stored against the digest the build produced.
//!
//! ## Usage
//!
//! ```bash
//! imageship release --project acme-prod --repository backend \
//!     --image api-server --version 1.4.2
//! imageship doctor             # Probe docker and gcloud before releasing
//! imageship setup --project acme-prod   # One-time registry configuration
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Core modules
pub mod auth;
pub mod cli;
pub mod docker;
pub mod error;
pub mod pipeline;
pub mod reference;
pub mod registry;

// Re-export main types for public API
pub use auth::{AuthToken, Authenticator, CredentialSource, GcloudAuthenticator};
pub use cli::Args;
pub use docker::{ContainerEngine, DockerEngine};
pub use error::{CliError, ReleaseError, Result};
pub use pipeline::{ReleaseOrchestrator, ReleaseRequest, ReleaseRun, RunPhase, StepKind};
pub use reference::{ImageDigest, ImageReference};
pub use registry::{HttpRegistryCatalog, RegistryCatalog};

use std::time::Duration;

/// Configuration for release pipeline runs
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    /// Maximum total push attempts before the run fails
    pub push_retry_limit: u32,
    /// Maximum total verification attempts before the warning is recorded
    pub verify_retry_limit: u32,
    /// Base delay for exponential backoff between retries
    pub backoff_base: Duration,
    /// Timeout for the authentication step
    pub auth_timeout: Duration,
    /// Timeout for the build step
    pub build_timeout: Duration,
    /// Timeout for the tag step
    pub tag_timeout: Duration,
    /// Timeout for the push step, covering all retry attempts
    pub push_timeout: Duration,
    /// Timeout for the verification step, covering all retry attempts
    pub verify_timeout: Duration,
    /// Skip the advisory verification step entirely
    pub skip_verify: bool,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            push_retry_limit: 3,
            verify_retry_limit: 2,
            backoff_base: Duration::from_secs(1),
            auth_timeout: Duration::from_secs(60),
            build_timeout: Duration::from_secs(1800),
            tag_timeout: Duration::from_secs(60),
            push_timeout: Duration::from_secs(600),
            // Two HTTP attempts at 20s each plus backoff must fit.
            verify_timeout: Duration::from_secs(60),
            skip_verify: false,
        }
    }
}
