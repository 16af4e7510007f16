//! HTTP catalog client for Docker Registry v2 endpoints.
//!
//! Verification is a HEAD request against the manifest endpoint. The
//! registry answers with a `Docker-Content-Digest` header, which is the
//! digest the pipeline compares against what it pushed.

use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;
use url::Url;

use crate::auth::AuthToken;
use crate::error::VerifyError;
use crate::reference::{ImageDigest, ImageReference};
use crate::registry::{ImageMetadata, RegistryCatalog};

/// Manifest media types we accept, covering Docker and OCI images plus
/// multi-platform indexes.
const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json";

/// Timeout for a single catalog request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Catalog client that speaks the Docker Registry v2 HTTP API.
#[derive(Clone)]
pub struct HttpRegistryCatalog {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl HttpRegistryCatalog {
    /// Create a catalog client with default headers and timeouts.
    pub fn new() -> Result<Self, VerifyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("imageship/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VerifyError::Network {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: None,
        })
    }

    /// Route all requests to `base_url` instead of deriving the endpoint
    /// from the reference host. Used to point at test servers.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    fn manifest_url(&self, reference: &ImageReference) -> Result<Url, VerifyError> {
        let network = |e: url::ParseError| VerifyError::Network {
            reason: format!("invalid registry endpoint: {e}"),
        };

        let base = match &self.base_url {
            Some(base) => base.clone(),
            None => Url::parse(&format!("https://{}", reference.registry_host()))
                .map_err(network)?,
        };

        base.join(&format!(
            "/v2/{}/manifests/{}",
            reference.repository_path(),
            reference.tag()
        ))
        .map_err(network)
    }
}

impl RegistryCatalog for HttpRegistryCatalog {
    async fn describe(
        &self,
        reference: &ImageReference,
        token: &AuthToken,
    ) -> Result<ImageMetadata, VerifyError> {
        let url = self.manifest_url(reference)?;

        let response = self
            .client
            .head(url)
            .header(ACCEPT, MANIFEST_ACCEPT)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        match status.as_u16() {
            200 => {
                let digest = response
                    .headers()
                    .get("docker-content-digest")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| ImageDigest::parse(s).ok())
                    .ok_or_else(|| VerifyError::DigestMissing {
                        reference: reference.to_string(),
                    })?;

                let media_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);

                let size_bytes = response
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok());

                log::debug!("registry lists {reference} as {digest}");
                Ok(ImageMetadata {
                    digest,
                    media_type,
                    size_bytes,
                })
            }
            404 => Err(VerifyError::NotFound {
                reference: reference.to_string(),
            }),
            401 | 403 => Err(VerifyError::Denied {
                status: status.as_u16(),
            }),
            s if status.is_server_error() => Err(VerifyError::Unavailable { status: s }),
            s => Err(VerifyError::Network {
                reason: format!("unexpected HTTP status {s}"),
            }),
        }
    }
}

fn classify_request_error(e: reqwest::Error) -> VerifyError {
    VerifyError::Network {
        reason: if e.is_timeout() {
            format!("request timed out: {e}")
        } else {
            e.to_string()
        },
    }
}
