//! Doctor command implementation.
//!
//! Probes the local toolchain so operators can see what a release would
//! need before running one.

use std::path::Path;

use serde::Serialize;

use crate::cli::commands::{EXIT_COMPLETED, EXIT_FAILURE};
use crate::cli::{DoctorArgs, OutputManager};
use crate::docker::{check_docker_available, has_base_image};
use crate::error::{ReleaseError, Result};

/// Outcome of a single environment probe.
#[derive(Debug, Serialize)]
struct CheckResult {
    name: &'static str,
    passed: bool,
    detail: String,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: detail.into(),
        }
    }

    fn glyph(&self) -> &'static str {
        if self.passed { "✓" } else { "✗" }
    }
}

/// Execute the doctor command and return the process exit code.
pub(super) async fn execute_doctor(args: &DoctorArgs, output: &OutputManager) -> Result<i32> {
    let mut checks = Vec::new();

    checks.push(check_binary("docker"));
    checks.push(check_daemon().await);
    checks.push(check_binary("gcloud"));

    if let Some(manifest) = &args.dockerfile_path {
        checks.push(check_manifest(manifest));
    }
    if let Some(context) = &args.context_dir {
        checks.push(check_context(context));
    }

    let all_passed = checks.iter().all(|check| check.passed);

    if args.json {
        let rendered = serde_json::to_string_pretty(&checks).map_err(ReleaseError::Json)?;
        output.emit(&rendered);
    } else {
        output.section("🩺 Environment checks");
        for check in &checks {
            output.indent(&format!("{} {:<16} {}", check.glyph(), check.name, check.detail));
        }
        if all_passed {
            output.success("Ready to release 🚀");
        } else {
            output.error("Environment is not ready; fix the failed checks above");
        }
    }

    Ok(if all_passed { EXIT_COMPLETED } else { EXIT_FAILURE })
}

fn check_binary(name: &'static str) -> CheckResult {
    match which::which(name) {
        Ok(path) => CheckResult::pass(name, path.display().to_string()),
        Err(_) => CheckResult::fail(name, "not found on PATH"),
    }
}

async fn check_daemon() -> CheckResult {
    match check_docker_available().await {
        Ok(()) => CheckResult::pass("docker daemon", "responding"),
        Err(e) => CheckResult::fail("docker daemon", e.to_string()),
    }
}

fn check_manifest(path: &Path) -> CheckResult {
    match std::fs::read_to_string(path) {
        Ok(contents) if has_base_image(&contents) => {
            CheckResult::pass("manifest", path.display().to_string())
        }
        Ok(_) => CheckResult::fail("manifest", "declares no FROM instruction"),
        Err(e) => CheckResult::fail("manifest", format!("{}: {e}", path.display())),
    }
}

fn check_context(path: &Path) -> CheckResult {
    if path.is_dir() {
        CheckResult::pass("context", path.display().to_string())
    } else {
        CheckResult::fail("context", format!("{} is not a directory", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn manifest_check_requires_a_base_image() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment only").unwrap();
        let result = check_manifest(file.path());
        assert!(!result.passed);

        writeln!(file, "FROM debian:stable-slim").unwrap();
        let result = check_manifest(file.path());
        assert!(result.passed);
    }

    #[test]
    fn context_check_rejects_files() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(!check_context(file.path()).passed);

        let dir = tempfile::tempdir().unwrap();
        assert!(check_context(dir.path()).passed);
    }
}
