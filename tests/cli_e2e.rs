//! End-to-end CLI tests for the piwigo-dl binary.

use assert_cmd::Command;
use predicates::prelude::*;

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("piwigo-dl").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Download Piwigo albums"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("piwigo-dl").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("piwigo-dl"));
}

/// Test that invoking without the required arguments fails with usage help.
#[test]
fn test_binary_without_args_fails_with_usage() {
    let mut cmd = Command::cargo_bin("piwigo-dl").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

/// Test that a non-http(s) server url is rejected before any network use.
#[test]
fn test_binary_rejects_non_http_url() {
    let mut cmd = Command::cargo_bin("piwigo-dl").unwrap();
    cmd.args(["12", "-U", "ftp://host/ws.php"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("http"));
}

/// Test that a failing album does not stop later albums: both are attempted
/// and the exit reports how many failed.
#[test]
fn test_binary_continues_past_failing_albums() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("piwigo-dl").unwrap();
    // Port 1 refuses connections, so every album fails fast.
    cmd.args(["1", "2", "-U", "http://127.0.0.1:1/ws.php"])
        .current_dir(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("2 album(s) failed"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let mut cmd = Command::cargo_bin("piwigo-dl").unwrap();
    cmd.arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
