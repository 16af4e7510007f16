//! Validated image references and content digests.
//!
//! An [`ImageReference`] is the fully qualified name of one release target:
//! `host/project/repository/image:version`. Construction validates every
//! component, so a reference in hand is always safe to hand to the pipeline.
//! [`ImageDigest`] wraps a `algo:hex` content digest and is the currency the
//! build, push, and verify steps compare.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ReferenceError;

/// Fully qualified reference to one image version in a cloud artifact registry.
///
/// The path layout follows the Artifact Registry convention of
/// `{host}/{project}/{repository}/{image}`. The version doubles as the image
/// tag and must be a semantic version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    registry_host: String,
    project: String,
    repository: String,
    image: String,
    version: Version,
}

impl ImageReference {
    /// Build a reference from its components, validating each one.
    pub fn new(
        registry_host: &str,
        project: &str,
        repository: &str,
        image: &str,
        version: &str,
    ) -> Result<Self, ReferenceError> {
        validate_host(registry_host)?;
        validate_path_component("project", project)?;
        validate_path_component("repository", repository)?;
        validate_path_component("image", image)?;
        let version = parse_version(version)?;

        Ok(Self {
            registry_host: registry_host.to_string(),
            project: project.to_string(),
            repository: repository.to_string(),
            image: image.to_string(),
            version,
        })
    }

    /// Registry host, e.g. `europe-west1-docker.pkg.dev`
    pub fn registry_host(&self) -> &str {
        &self.registry_host
    }

    /// Cloud project id
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Artifact repository within the project
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Image name within the repository
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Release version
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Version rendered as the image tag
    pub fn tag(&self) -> String {
        self.version.to_string()
    }

    /// Repository path below the host, without the tag
    pub fn repository_path(&self) -> String {
        format!("{}/{}/{}", self.project, self.repository, self.image)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}:{}",
            self.registry_host, self.project, self.repository, self.image, self.version
        )
    }
}

impl FromStr for ImageReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, tag) = s.rsplit_once(':').ok_or_else(|| ReferenceError::Unparsable {
            reference: s.to_string(),
            reason: "expected ':<version>' suffix".to_string(),
        })?;

        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != 4 {
            return Err(ReferenceError::Unparsable {
                reference: s.to_string(),
                reason: format!(
                    "expected host/project/repository/image, found {} path segment(s)",
                    parts.len()
                ),
            });
        }

        Self::new(parts[0], parts[1], parts[2], parts[3], tag)
    }
}

/// Content digest of an image, in `algorithm:hex` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageDigest(String);

impl ImageDigest {
    /// Parse and validate a digest string.
    pub fn parse(digest: &str) -> Result<Self, ReferenceError> {
        let invalid = |reason: &str| ReferenceError::InvalidDigest {
            digest: digest.to_string(),
            reason: reason.to_string(),
        };

        let (algorithm, hex) = digest
            .split_once(':')
            .ok_or_else(|| invalid("expected '<algorithm>:<hex>'"))?;

        let expected_len = match algorithm {
            "sha256" => 64,
            "sha512" => 128,
            _ => return Err(invalid("unsupported digest algorithm")),
        };

        if hex.len() != expected_len {
            return Err(invalid(&format!(
                "expected {} hex characters, found {}",
                expected_len,
                hex.len()
            )));
        }

        if !hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(invalid("digest hex must be lowercase hexadecimal"));
        }

        Ok(Self(digest.to_string()))
    }

    /// Full digest string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated hex prefix for log lines
    pub fn short(&self) -> &str {
        match self.0.split_once(':') {
            Some((_, hex)) if hex.len() >= 12 => &hex[..12],
            _ => &self.0,
        }
    }
}

impl fmt::Display for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ImageDigest {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImageDigest> for String {
    fn from(digest: ImageDigest) -> Self {
        digest.0
    }
}

fn parse_version(version: &str) -> Result<Version, ReferenceError> {
    let trimmed = version.trim();
    if trimmed.is_empty() {
        return Err(ReferenceError::EmptyComponent {
            component: "version",
        });
    }
    // Accept a leading 'v' the way release tags are often written.
    let normalized = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(normalized).map_err(|source| ReferenceError::InvalidVersion {
        version: version.to_string(),
        source,
    })
}

fn validate_host(host: &str) -> Result<(), ReferenceError> {
    let invalid = |reason: &str| ReferenceError::InvalidHost {
        host: host.to_string(),
        reason: reason.to_string(),
    };

    if host.trim().is_empty() {
        return Err(ReferenceError::EmptyComponent {
            component: "registry host",
        });
    }
    if host.contains('/') {
        return Err(invalid("host must not contain '/'"));
    }
    if host.contains(char::is_whitespace) {
        return Err(invalid("host must not contain whitespace"));
    }

    // Split off an optional port before checking the name itself.
    let name = match host.rsplit_once(':') {
        Some((name, port)) => {
            if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("port must be numeric"));
            }
            name
        }
        None => host,
    };

    if name.is_empty() {
        return Err(invalid("host name must not be empty"));
    }
    let valid_host_byte =
        |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-';
    if !name.bytes().all(valid_host_byte) {
        return Err(invalid(
            "host may only contain lowercase letters, digits, '.', and '-'",
        ));
    }
    if name.starts_with('.') || name.ends_with('.') || name.starts_with('-') {
        return Err(invalid("host must not start or end with a separator"));
    }

    Ok(())
}

fn validate_path_component(component: &'static str, value: &str) -> Result<(), ReferenceError> {
    let invalid = |reason: &str| ReferenceError::InvalidComponent {
        component,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value.trim().is_empty() {
        return Err(ReferenceError::EmptyComponent { component });
    }
    if value.contains(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }
    if value.contains('/') {
        return Err(invalid("must not contain '/'"));
    }

    let valid_byte = |b: u8| {
        b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'_' || b == b'-'
    };
    if !value.bytes().all(valid_byte) {
        return Err(invalid(
            "may only contain lowercase letters, digits, '.', '_', and '-'",
        ));
    }

    let first = value.as_bytes()[0];
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return Err(invalid("must start with a lowercase letter or digit"));
    }

    Ok(())
}
