//! Smoke tests for the `rh` binary.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn rh_binary() -> String {
    env!("CARGO_BIN_EXE_rh").to_string()
}

/// Runs `rh` with an isolated home and no `RH_*` environment.
fn run_rh(home: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(rh_binary());
    command
        .env("HOME", home)
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("RUST_LOG");
    for key in ["RH_BASE_URL", "RH_ORGANIZATION", "RH_AUTH_TOKEN", "RH_ENVIRONMENTS"] {
        command.env_remove(key);
    }
    command.args(args).output().expect("failed to run rh")
}

#[test]
fn help_lists_subcommands() {
    let temp = TempDir::new().unwrap();
    let output = run_rh(temp.path(), &["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["bounds", "stats", "details", "releases"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn missing_organization_is_reported() {
    let temp = TempDir::new().unwrap();
    let output = run_rh(temp.path(), &["bounds", "1.0"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("missing organization"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn invalid_period_is_rejected_by_parser() {
    let temp = TempDir::new().unwrap();
    let output = run_rh(
        temp.path(),
        &["stats", "1.0", "--project", "1", "--period", "14y"],
    );
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn oversized_period_is_rejected_by_parser() {
    let temp = TempDir::new().unwrap();
    for period in ["4294967295w", "100000000d"] {
        let output = run_rh(
            temp.path(),
            &["stats", "1.0", "--project", "1", "--period", period],
        );
        assert_eq!(output.status.code(), Some(2), "accepted {period}");
    }
}

#[test]
fn releases_requires_a_project() {
    let temp = TempDir::new().unwrap();
    let output = run_rh(temp.path(), &["releases", "1.0"]);
    assert_eq!(output.status.code(), Some(2));
}

/// Writes a config pointing at a port nothing listens on.
fn unreachable_config(dir: &Path) -> std::path::PathBuf {
    let config_path = dir.join("rh.toml");
    std::fs::write(
        &config_path,
        "base_url = \"http://127.0.0.1:9\"\norganization = \"acme\"\nauth_token = \"token\"\n",
    )
    .unwrap();
    config_path
}

#[test]
fn unreachable_backend_fails_with_context() {
    let temp = TempDir::new().unwrap();
    let config_path = unreachable_config(temp.path());

    let output = run_rh(
        temp.path(),
        &[
            "--config",
            config_path.to_str().unwrap(),
            "bounds",
            "1.0",
        ],
    );
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("failed to fetch release 1.0"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn failed_fetch_reports_underlying_error() {
    let temp = TempDir::new().unwrap();
    let config_path = unreachable_config(temp.path());

    let output = run_rh(
        temp.path(),
        &[
            "--config",
            config_path.to_str().unwrap(),
            "stats",
            "1.0",
            "--project",
            "1",
            "--period",
            "24h",
        ],
    );
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Error loading chart data"),
        "unexpected stderr: {stderr}"
    );
    assert!(stderr.contains("request failed"), "unexpected stderr: {stderr}");
}
