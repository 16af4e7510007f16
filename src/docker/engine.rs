//! Docker CLI engine.
//!
//! Drives `docker build`, `docker tag`, and `docker push` as child processes,
//! streaming build output and classifying failures into the error taxonomy.
//! Children are spawned with `kill_on_drop` so a cancelled pipeline step does
//! not leave a build or push running in the background.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

use crate::auth::AuthToken;
use crate::cli::OutputManager;
use crate::docker::ContainerEngine;
use crate::error::{
    BuildError, PermanentPushError, PushError, TagError, TransientPushError,
};
use crate::reference::{ImageDigest, ImageReference};

/// Timeout for the Docker daemon availability check
pub const DOCKER_INFO_TIMEOUT: Duration = Duration::from_secs(5);

/// Platform-specific Docker startup instructions
#[cfg(target_os = "macos")]
const DOCKER_START_HELP: &str = "Start Docker Desktop from Applications or Spotlight";

#[cfg(target_os = "linux")]
const DOCKER_START_HELP: &str = "Start Docker daemon: sudo systemctl start docker";

#[cfg(target_os = "windows")]
const DOCKER_START_HELP: &str = "Start Docker Desktop from the Start menu";

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Checks if Docker is installed and the daemon is running.
pub async fn check_docker_available() -> Result<(), BuildError> {
    let status_result = timeout(
        DOCKER_INFO_TIMEOUT,
        Command::new("docker")
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status(),
    )
    .await;

    match status_result {
        // Timeout occurred
        Err(_) => Err(BuildError::DaemonUnavailable {
            reason: format!(
                "daemon check timed out after {}s. {}",
                DOCKER_INFO_TIMEOUT.as_secs(),
                DOCKER_START_HELP
            ),
        }),

        // Command succeeded
        Ok(Ok(status)) if status.success() => Ok(()),

        // Docker command exists but daemon isn't responding
        Ok(Ok(status)) => Err(BuildError::DaemonUnavailable {
            reason: format!(
                "daemon is not responding (exit code {}). {}",
                status.code().unwrap_or(-1),
                DOCKER_START_HELP
            ),
        }),

        // Docker command not found
        Ok(Err(_)) => Err(BuildError::ToolNotFound {
            tool: "docker".to_string(),
        }),
    }
}

/// Container engine backed by the `docker` CLI.
///
/// Keeps an append-only index from built digest to local image id, which the
/// tag step uses to detect whether the built artifact still exists locally,
/// and a per-reference note of builds that could only report an image id,
/// which keeps push digests comparable to build digests.
pub struct DockerEngine {
    output: OutputManager,
    build_index: RwLock<HashMap<ImageDigest, String>>,
    id_addressed: RwLock<HashMap<String, ImageDigest>>,
}

impl DockerEngine {
    /// Create an engine that reports progress through `output`.
    pub fn new(output: OutputManager) -> Self {
        Self {
            output,
            build_index: RwLock::new(HashMap::new()),
            id_addressed: RwLock::new(HashMap::new()),
        }
    }

    /// Record a built digest and its local image id. Entries are never
    /// replaced; the first build wins for a given digest.
    fn record_build(&self, digest: &ImageDigest, image_id: &str) {
        if let Ok(mut index) = self.build_index.write() {
            index
                .entry(digest.clone())
                .or_insert_with(|| image_id.to_string());
        }
    }

    /// Local image id recorded for `digest`, if this process built it.
    fn image_id_for(&self, digest: &ImageDigest) -> Option<String> {
        self.build_index
            .read()
            .ok()
            .and_then(|index| index.get(digest).cloned())
    }

    /// Track how `reference`'s latest build digest is addressed. A manifest
    /// digest clears the note; an image-id digest records it so push can
    /// stay in the same address space.
    fn record_addressing(
        &self,
        reference: &ImageReference,
        digest: &ImageDigest,
        manifest_addressed: bool,
    ) {
        if let Ok(mut notes) = self.id_addressed.write() {
            if manifest_addressed {
                notes.remove(&reference.to_string());
            } else {
                notes.insert(reference.to_string(), digest.clone());
            }
        }
    }

    /// Build digest for `reference` when it is only a local image id.
    fn id_addressed_digest(&self, reference: &ImageReference) -> Option<ImageDigest> {
        self.id_addressed
            .read()
            .ok()
            .and_then(|notes| notes.get(&reference.to_string()).cloned())
    }

    async fn run_build(
        &self,
        manifest: &Path,
        context: &Path,
        reference: &ImageReference,
    ) -> Result<ImageDigest, BuildError> {
        if !context.is_dir() {
            return Err(BuildError::ContextMissing {
                path: context.to_path_buf(),
            });
        }

        let manifest_contents = match std::fs::read_to_string(manifest) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BuildError::ManifestMissing {
                    path: manifest.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(BuildError::ManifestUnreadable {
                    path: manifest.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };
        if !has_base_image(&manifest_contents) {
            return Err(BuildError::NoBaseImage {
                path: manifest.to_path_buf(),
            });
        }

        let scratch = BuildScratch::new();

        self.output
            .progress(&format!("Building image {reference}"));

        // Spawn with piped stdout for streaming; stderr is collected for
        // failure classification.
        let mut child = Command::new("docker")
            .arg("build")
            .args(["-t", &reference.to_string()])
            .arg("-f")
            .arg(manifest)
            .arg("--iidfile")
            .arg(&scratch.iid)
            .arg("--metadata-file")
            .arg(&scratch.metadata)
            .arg(context)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => BuildError::ToolNotFound {
                    tool: "docker".to_string(),
                },
                _ => BuildError::BuildFailed {
                    reason: e.to_string(),
                },
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Drain both pipes to EOF before waiting, so a chatty build cannot
        // deadlock on a full pipe buffer.
        let stream_stdout = async {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    self.output.indent(&line);
                }
            }
        };
        let collect_stderr = async {
            let mut collected = String::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::debug!("docker build: {line}");
                    collected.push_str(&line);
                    collected.push('\n');
                }
            }
            collected
        };
        let ((), stderr_buf) = tokio::join!(stream_stdout, collect_stderr);

        let status = child.wait().await.map_err(|e| BuildError::BuildFailed {
            reason: e.to_string(),
        })?;

        if !status.success() {
            if is_daemon_unreachable(&stderr_buf) {
                return Err(BuildError::DaemonUnavailable {
                    reason: failure_detail(&stderr_buf),
                });
            }
            return Err(BuildError::BuildFailed {
                reason: format!(
                    "exit code {}: {}",
                    status.code().unwrap_or(-1),
                    failure_detail(&stderr_buf)
                ),
            });
        }

        let (digest, image_id, manifest_addressed) =
            read_build_digest(&scratch.iid, &scratch.metadata)?;

        if !manifest_addressed {
            log::warn!("{reference}: build metadata held no manifest digest; using the image id");
        }
        self.record_build(&digest, &image_id);
        self.record_addressing(reference, &digest, manifest_addressed);
        self.output
            .success(&format!("Built {} ({})", reference, digest.short()));
        Ok(digest)
    }

    async fn run_tag(
        &self,
        digest: &ImageDigest,
        reference: &ImageReference,
    ) -> Result<(), TagError> {
        // Without an index entry, fall back to addressing the image by the
        // digest itself. That only resolves while the artifact still exists.
        let image_id = self
            .image_id_for(digest)
            .unwrap_or_else(|| digest.as_str().to_string());

        if local_image_id(&image_id).await.is_none() {
            return Err(TagError::ArtifactEvicted {
                digest: digest.to_string(),
                reference: reference.to_string(),
            });
        }

        // Skip the tag command when the reference already points at the image.
        if let Some(current) = local_image_id(&reference.to_string()).await
            && current == image_id
        {
            self.output
                .verbose_println(&format!("{reference} already tagged, skipping"));
            return Ok(());
        }

        let output = Command::new("docker")
            .args(["tag", &image_id, &reference.to_string()])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TagError::TagFailed {
                reference: reference.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.to_lowercase().contains("no such image") {
                return Err(TagError::ArtifactEvicted {
                    digest: digest.to_string(),
                    reference: reference.to_string(),
                });
            }
            return Err(TagError::TagFailed {
                reference: reference.to_string(),
                reason: failure_detail(&stderr),
            });
        }

        self.output
            .verbose_println(&format!("Tagged {} as {}", digest.short(), reference));
        Ok(())
    }

    async fn run_push(
        &self,
        reference: &ImageReference,
        token: &AuthToken,
    ) -> Result<ImageDigest, PushError> {
        self.login(reference.registry_host(), token).await?;

        self.output.progress(&format!("Pushing {reference}"));

        let output = Command::new("docker")
            .args(["push", &reference.to_string()])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PushError::Transient(TransientPushError::ConnectionReset {
                    reason: e.to_string(),
                })
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(classify_push_failure(&stderr, reference));
        }

        // The digest line can land on either stream depending on the client.
        let digest = parse_push_digest(&stdout)
            .or_else(|| parse_push_digest(&stderr))
            .ok_or_else(|| {
                PushError::Permanent(PermanentPushError::DigestUnparsable {
                    output: failure_detail(&stdout),
                })
            })?;

        log::debug!("registry reported digest {digest} for {reference}");

        // A build that fell back to the image id leaves nothing the registry
        // digest can be compared against. Stay in the build's address space
        // and leave the registry value in the log.
        if let Some(built) = self.id_addressed_digest(reference) {
            log::warn!(
                "{reference}: digest comparison limited to the local image id; registry reported {digest}"
            );
            return Ok(built);
        }
        Ok(digest)
    }

    /// Log the Docker client into the registry with the bearer token.
    ///
    /// Artifact Registry accepts OAuth access tokens as the password for the
    /// `oauth2accesstoken` user.
    async fn login(&self, host: &str, token: &AuthToken) -> Result<(), PushError> {
        let mut child = Command::new("docker")
            .args([
                "login",
                "--username",
                "oauth2accesstoken",
                "--password-stdin",
            ])
            .arg(format!("https://{host}"))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PushError::Transient(TransientPushError::ConnectionReset {
                    reason: e.to_string(),
                })
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(token.secret().as_bytes())
                .await
                .map_err(|e| {
                    PushError::Transient(TransientPushError::ConnectionReset {
                        reason: e.to_string(),
                    })
                })?;
            drop(stdin);
        }

        let output = child.wait_with_output().await.map_err(|e| {
            PushError::Transient(TransientPushError::ConnectionReset {
                reason: e.to_string(),
            })
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_login_failure(&stderr));
        }

        log::debug!("docker login succeeded for {host}");
        Ok(())
    }
}

impl ContainerEngine for DockerEngine {
    async fn build(
        &self,
        manifest: &Path,
        context: &Path,
        reference: &ImageReference,
    ) -> Result<ImageDigest, BuildError> {
        self.run_build(manifest, context, reference).await
    }

    async fn tag(&self, digest: &ImageDigest, reference: &ImageReference) -> Result<(), TagError> {
        self.run_tag(digest, reference).await
    }

    async fn push(
        &self,
        reference: &ImageReference,
        token: &AuthToken,
    ) -> Result<ImageDigest, PushError> {
        self.run_push(reference, token).await
    }
}

/// Image id for a local image name, or `None` when it does not exist.
async fn local_image_id(name: &str) -> Option<String> {
    let output = Command::new("docker")
        .args(["image", "inspect", "--format", "{{.Id}}", name])
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }
    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if id.is_empty() { None } else { Some(id) }
}

/// Whether the manifest declares at least one FROM instruction.
pub(crate) fn has_base_image(manifest: &str) -> bool {
    manifest.lines().any(|line| {
        let trimmed = line.trim();
        !trimmed.starts_with('#')
            && trimmed
                .split_whitespace()
                .next()
                .is_some_and(|word| word.eq_ignore_ascii_case("FROM"))
    })
}

/// Read the digest the build produced, preferring the BuildKit metadata file
/// (its digest matches what the registry will report on push) and falling
/// back to the image id file. The flag in the result is true when the digest
/// is a manifest digest.
fn read_build_digest(
    iid_path: &Path,
    metadata_path: &Path,
) -> Result<(ImageDigest, String, bool), BuildError> {
    let image_id = std::fs::read_to_string(iid_path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let metadata_digest = std::fs::read_to_string(metadata_path)
        .ok()
        .and_then(|contents| serde_json::from_str::<serde_json::Value>(&contents).ok())
        .and_then(|v| {
            v.get("containerimage.digest")
                .and_then(|d| d.as_str())
                .map(str::to_string)
        })
        .and_then(|d| ImageDigest::parse(&d).ok());

    if let Some(digest) = metadata_digest {
        let id = image_id.unwrap_or_else(|| digest.as_str().to_string());
        return Ok((digest, id, true));
    }

    if let Some(id) = image_id {
        let digest = ImageDigest::parse(&id).map_err(|e| BuildError::DigestUnavailable {
            reason: format!("image id file held '{id}': {e}"),
        })?;
        return Ok((digest, id, false));
    }

    Err(BuildError::DigestUnavailable {
        reason: "build wrote neither a metadata digest nor an image id".to_string(),
    })
}

/// Scratch files the build writes its digest into. Removed on drop, which
/// also covers error returns and cancelled build futures.
struct BuildScratch {
    iid: PathBuf,
    metadata: PathBuf,
}

impl BuildScratch {
    fn new() -> Self {
        Self {
            iid: scratch_path("iid"),
            metadata: scratch_path("metadata"),
        }
    }
}

impl Drop for BuildScratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.iid);
        let _ = std::fs::remove_file(&self.metadata);
    }
}

fn scratch_path(kind: &str) -> PathBuf {
    let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("imageship-{}-{}-{}", kind, std::process::id(), n))
}

fn is_daemon_unreachable(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("cannot connect to the docker daemon")
        || lower.contains("docker daemon is not running")
        || lower.contains("error during connect")
}

/// Last non-empty line of command output, the line Docker puts the cause on.
fn failure_detail(output: &str) -> String {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no error output")
        .to_string()
}

/// Extract the `digest: sha256:...` value from push output.
fn parse_push_digest(output: &str) -> Option<ImageDigest> {
    for line in output.lines() {
        if let Some(idx) = line.find("digest:") {
            let rest = &line[idx + "digest:".len()..];
            if let Some(candidate) = rest.split_whitespace().next()
                && let Ok(digest) = ImageDigest::parse(candidate)
            {
                return Some(digest);
            }
        }
    }
    None
}

/// Classify push stderr into the transient/permanent taxonomy.
fn classify_push_failure(stderr: &str, reference: &ImageReference) -> PushError {
    let detail = failure_detail(stderr);
    let lower = stderr.to_lowercase();

    // Immutable-tag rejections also mention "denied", so check them first.
    if lower.contains("immutable") || lower.contains("cannot be overwritten") {
        return PushError::Permanent(PermanentPushError::TagImmutable {
            reference: reference.to_string(),
        });
    }

    if lower.contains("unauthorized") || lower.contains("authentication required") {
        return PushError::Permanent(PermanentPushError::Unauthorized {
            status: 401,
            reason: detail,
        });
    }
    if lower.contains("denied") || lower.contains("permission") || lower.contains("forbidden") {
        return PushError::Permanent(PermanentPushError::Unauthorized {
            status: 403,
            reason: detail,
        });
    }

    if let Some(transient) = transient_network_failure(&lower, &detail) {
        return transient;
    }

    PushError::Permanent(PermanentPushError::Rejected { reason: detail })
}

/// Classify `docker login` stderr. Login also fails when the registry
/// itself is unreachable, and those failures retry like any other
/// transient push error; everything else is a credential rejection.
fn classify_login_failure(stderr: &str) -> PushError {
    let detail = failure_detail(stderr);
    let lower = stderr.to_lowercase();

    if lower.contains("unauthorized")
        || lower.contains("authentication required")
        || lower.contains("incorrect username or password")
    {
        return PushError::Permanent(PermanentPushError::Unauthorized {
            status: 401,
            reason: detail,
        });
    }
    if lower.contains("denied") || lower.contains("forbidden") {
        return PushError::Permanent(PermanentPushError::Unauthorized {
            status: 403,
            reason: detail,
        });
    }

    if let Some(transient) = transient_network_failure(&lower, &detail) {
        return transient;
    }

    PushError::Permanent(PermanentPushError::Unauthorized {
        status: 401,
        reason: detail,
    })
}

/// Network-level failures every registry operation retries: 5xx/429
/// statuses, timeouts, and dropped or unestablishable connections.
fn transient_network_failure(lower: &str, detail: &str) -> Option<PushError> {
    for (marker, status) in [
        ("503", 503),
        ("service unavailable", 503),
        ("502", 502),
        ("bad gateway", 502),
        ("500", 500),
        ("internal server error", 500),
        ("429", 429),
        ("too many requests", 429),
    ] {
        if lower.contains(marker) {
            return Some(PushError::Transient(
                TransientPushError::RegistryUnavailable {
                    status,
                    reason: detail.to_string(),
                },
            ));
        }
    }

    if lower.contains("timeout") || lower.contains("timed out") {
        return Some(PushError::Transient(TransientPushError::TimedOut {
            reason: detail.to_string(),
        }));
    }

    if lower.contains("connection reset")
        || lower.contains("broken pipe")
        || lower.contains("unexpected eof")
        || lower.contains("connection refused")
        || lower.contains("dial tcp")
        || lower.contains("no such host")
        || lower.contains("blob upload unknown")
    {
        return Some(PushError::Transient(TransientPushError::ConnectionReset {
            reason: detail.to_string(),
        }));
    }

    None
}
