//! Container engine integration.
//!
//! The pipeline drives builds, tags, and pushes through a [`ContainerEngine`]
//! implementation. The production implementation shells out to the `docker`
//! CLI; tests substitute in-memory fakes.

mod engine;

pub use engine::{DockerEngine, check_docker_available};
pub(crate) use engine::has_base_image;

use std::future::Future;
use std::path::Path;

use crate::auth::AuthToken;
use crate::error::{BuildError, PushError, TagError};
use crate::reference::{ImageDigest, ImageReference};

/// Build, tag, and push operations against a container engine.
///
/// Implementations must report build and push digests from the same address
/// space, so that comparing them detects whether the registry stored the
/// bytes the build produced.
pub trait ContainerEngine {
    /// Build an image from `manifest` within `context`, applying `reference`
    /// as the build-time tag. Returns the content digest of the result.
    ///
    /// Builds are deterministic enough to re-run but are never retried:
    /// a failure is surfaced verbatim for the operator to act on.
    fn build(
        &self,
        manifest: &Path,
        context: &Path,
        reference: &ImageReference,
    ) -> impl Future<Output = Result<ImageDigest, BuildError>>;

    /// Ensure `reference` points at the image with `digest` in the local
    /// cache. A no-op when the tag already points there; fails when the
    /// built artifact has been evicted.
    fn tag(
        &self,
        digest: &ImageDigest,
        reference: &ImageReference,
    ) -> impl Future<Output = Result<(), TagError>>;

    /// Upload `reference` to its registry, authorizing with `token`.
    /// Returns the digest the registry reports for the stored image.
    fn push(
        &self,
        reference: &ImageReference,
        token: &AuthToken,
    ) -> impl Future<Output = Result<ImageDigest, PushError>>;
}
