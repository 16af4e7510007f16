//! Black-box tests through the compiled binary.
//!
//! These cover argument parsing and the validation that runs before any
//! external tool is touched; nothing here needs docker or gcloud.

use assert_cmd::Command;
use predicates::prelude::*;

fn imageship() -> Command {
    let mut cmd = Command::cargo_bin("imageship").expect("binary builds");
    cmd.env_remove("IMAGESHIP_PROJECT")
        .env_remove("IMAGESHIP_REPOSITORY")
        .env_remove("IMAGESHIP_IMAGE")
        .env_remove("IMAGESHIP_REGISTRY_HOST")
        .env_remove("IMAGESHIP_RETRY_PUSH")
        .env_remove("IMAGESHIP_RETRY_VERIFY")
        .env_remove("IMAGESHIP_BACKOFF_SECS")
        .env_remove("IMAGESHIP_AUTH_TOKEN");
    cmd
}

#[test]
fn help_lists_the_subcommands() {
    imageship()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("release"))
        .stdout(predicate::str::contains("doctor"))
        .stdout(predicate::str::contains("setup"));
}

#[test]
fn release_help_lists_the_target_flags() {
    imageship()
        .args(["release", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--project"))
        .stdout(predicate::str::contains("--repository"))
        .stdout(predicate::str::contains("--image"))
        .stdout(predicate::str::contains("--version"))
        .stdout(predicate::str::contains("--dockerfile-path"))
        .stdout(predicate::str::contains("--context-dir"));
}

#[test]
fn missing_required_arguments_exit_with_usage_error() {
    imageship()
        .args(["release", "--project", "acme-prod"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("required"));
}

#[test]
fn blank_version_is_rejected_before_any_work() {
    imageship()
        .args([
            "release",
            "--project",
            "acme-prod",
            "--repository",
            "backend",
            "--image",
            "api-server",
            "--version",
            "  ",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Version is required"));
}

#[test]
fn malformed_version_is_rejected_before_any_work() {
    imageship()
        .args([
            "release",
            "--project",
            "acme-prod",
            "--repository",
            "backend",
            "--image",
            "api-server",
            "--version",
            "not.a.version",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid release target"));
}

#[test]
fn doctor_exits_within_the_documented_codes() {
    // The probes depend on what the host has installed; only the JSON
    // shape and the 0/1 contract are stable here.
    imageship()
        .args(["doctor", "--json"])
        .assert()
        .code(predicate::in_iter(vec![0, 1]))
        .stdout(predicate::str::contains("\"passed\""));
}
