//! gcloud-backed token acquisition.
//!
//! Shells out to the Google Cloud SDK and classifies its stderr into the
//! [`AuthError`] taxonomy so the CLI can print targeted recovery steps.

use std::path::Path;
use tokio::process::Command;

use crate::auth::{AuthToken, Authenticator, CredentialSource};
use crate::error::AuthError;

/// Authenticator that exchanges gcloud credentials for registry tokens.
pub struct GcloudAuthenticator {
    source: CredentialSource,
    project: String,
}

impl GcloudAuthenticator {
    /// Create an authenticator for `source`, attributing failures to `project`.
    pub fn new(source: CredentialSource, project: &str) -> Self {
        Self {
            source,
            project: project.to_string(),
        }
    }

    async fn print_access_token(&self) -> Result<AuthToken, AuthError> {
        which::which("gcloud").map_err(|_| AuthError::ToolNotFound {
            tool: "gcloud".to_string(),
        })?;

        let output = Command::new("gcloud")
            .args(["auth", "print-access-token", "--quiet"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AuthError::CommandFailed {
                command: "gcloud auth print-access-token".to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.classify_token_failure("gcloud auth print-access-token", &stderr));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(AuthError::CommandFailed {
                command: "gcloud auth print-access-token".to_string(),
                reason: "command printed no token".to_string(),
            });
        }

        log::debug!("acquired registry access token ({} bytes)", token.len());
        Ok(AuthToken::new(token))
    }

    async fn activate_service_account(&self, key_file: &Path) -> Result<(), AuthError> {
        let metadata =
            std::fs::metadata(key_file).map_err(|e| AuthError::KeyFileUnreadable {
                path: key_file.to_path_buf(),
                reason: e.to_string(),
            })?;
        if !metadata.is_file() {
            return Err(AuthError::KeyFileUnreadable {
                path: key_file.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }

        which::which("gcloud").map_err(|_| AuthError::ToolNotFound {
            tool: "gcloud".to_string(),
        })?;

        let output = Command::new("gcloud")
            .args(["auth", "activate-service-account", "--quiet", "--key-file"])
            .arg(key_file)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AuthError::CommandFailed {
                command: "gcloud auth activate-service-account".to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(
                self.classify_token_failure("gcloud auth activate-service-account", &stderr)
            );
        }

        Ok(())
    }

    /// Map gcloud stderr to an [`AuthError`]; `command` names the failed
    /// invocation when nothing more specific matches.
    fn classify_token_failure(&self, command: &str, stderr: &str) -> AuthError {
        let lower = stderr.to_lowercase();

        if lower.contains("do not currently have an active account")
            || lower.contains("no credentialed accounts")
            || lower.contains("application default credentials were not found")
        {
            return AuthError::MissingCredentials {
                reason: first_line(stderr),
            };
        }

        if lower.contains("reauthentication required")
            || lower.contains("invalid_grant")
            || lower.contains("token has been expired or revoked")
            || lower.contains("credentials have expired")
        {
            return AuthError::ExpiredCredentials {
                reason: first_line(stderr),
            };
        }

        if lower.contains("service_disabled")
            || lower.contains("has not been used in project")
            || lower.contains("artifactregistry.googleapis.com")
        {
            return AuthError::ApiNotEnabled {
                project: self.project.clone(),
            };
        }

        AuthError::CommandFailed {
            command: command.to_string(),
            reason: first_line(stderr),
        }
    }
}

impl Authenticator for GcloudAuthenticator {
    async fn authenticate(&self) -> Result<AuthToken, AuthError> {
        match &self.source {
            CredentialSource::StaticToken(token) => Ok(token.clone()),
            CredentialSource::GcloudSession => self.print_access_token().await,
            CredentialSource::ServiceAccountKey(path) => {
                self.activate_service_account(path).await?;
                self.print_access_token().await
            }
        }
    }
}

fn first_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no error output")
        .to_string()
}
