//! Registry authentication.
//!
//! Credentials come from a pluggable [`CredentialSource`]: the operator's
//! active gcloud session, a service-account key file, or a pre-issued token
//! from CI secrets. Whatever the source, authentication produces an opaque
//! [`AuthToken`] that the push and verify steps carry to the registry.

mod gcloud;

pub use gcloud::GcloudAuthenticator;

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use crate::error::AuthError;

/// Opaque bearer token for registry operations.
///
/// The secret never appears in Debug output or serialized run summaries.
#[derive(Clone)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a token value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw token value, for Authorization headers and login stdin.
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(****)")
    }
}

/// Where registry credentials come from.
#[derive(Debug, Clone, Serialize)]
pub enum CredentialSource {
    /// The operator's active gcloud login session
    GcloudSession,
    /// A service-account key file on disk
    ServiceAccountKey(PathBuf),
    /// A pre-issued token, e.g. from CI secrets
    #[serde(serialize_with = "serialize_redacted")]
    StaticToken(AuthToken),
}

fn serialize_redacted<S>(_token: &AuthToken, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("****")
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::GcloudSession => write!(f, "active gcloud session"),
            CredentialSource::ServiceAccountKey(path) => {
                write!(f, "service-account key {}", path.display())
            }
            CredentialSource::StaticToken(_) => write!(f, "static token"),
        }
    }
}

/// Exchanges a credential source for a registry bearer token.
pub trait Authenticator {
    /// Acquire a token for registry operations.
    ///
    /// Failures are user-facing and never retried by the pipeline.
    fn authenticate(&self) -> impl Future<Output = Result<AuthToken, AuthError>>;
}
