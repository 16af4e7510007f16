//! Registry catalog queries.
//!
//! After a push, the pipeline asks the registry whether the reference is
//! actually listed and fetchable. The catalog is read-only; nothing here
//! mutates registry state.

mod http;

pub use http::HttpRegistryCatalog;

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::auth::AuthToken;
use crate::error::VerifyError;
use crate::reference::{ImageDigest, ImageReference};

/// Metadata the registry reports for a stored reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Content digest of the stored manifest
    pub digest: ImageDigest,
    /// Manifest media type, when reported
    pub media_type: Option<String>,
    /// Manifest size in bytes, when reported
    pub size_bytes: Option<u64>,
}

/// Read-only queries against a registry catalog.
pub trait RegistryCatalog {
    /// Confirm `reference` is listed and fetchable, returning its metadata.
    fn describe(
        &self,
        reference: &ImageReference,
        token: &AuthToken,
    ) -> impl Future<Output = Result<ImageMetadata, VerifyError>>;
}
