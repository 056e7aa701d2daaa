//! Smoke tests -- verify the binary runs and config handling exits cleanly.

use assert_cmd::Command;
use predicates::prelude::*;

fn sentinel() -> Command {
    let mut cmd = Command::cargo_bin("sentinel").unwrap();
    cmd.env_remove("SENTINEL_CONFIG")
        .env_remove("SENTINEL_TELEGRAM_TOKEN")
        .env_remove("SENTINEL_TELEGRAM_CHAT_ID")
        .env_remove("SENTINEL_ORACLE_API_KEY")
        .env("RUST_LOG", "warn");
    cmd
}

fn write_config(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("sentinel.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_cli_help() {
    sentinel()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Drift-gated self-healing monitor"));
}

#[test]
fn test_cli_version() {
    sentinel()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sentinel"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["run", "check-config", "probe", "incidents", "observations"] {
        sentinel().args([sub, "--help"]).assert().success();
    }
}

#[test]
fn test_check_config_without_credentials_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[oracle]\nenabled = false\n");
    sentinel()
        .arg("--config")
        .arg(&path)
        .arg("check-config")
        .assert()
        .code(2);
}

#[test]
fn test_check_config_with_env_credentials_passes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "[oracle]\nenabled = false\n\n[detector]\nfloor = 20.0\nceiling = 70.0\n",
    );
    sentinel()
        .arg("--config")
        .arg(&path)
        .arg("check-config")
        .env("SENTINEL_TELEGRAM_TOKEN", "123:abc")
        .env("SENTINEL_TELEGRAM_CHAT_ID", "42")
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration OK"))
        .stdout(predicate::str::contains("floor 20 / ceiling 70"));
}

#[test]
fn test_check_config_rejects_inverted_thresholds() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "[oracle]\nenabled = false\n\n[detector]\nfloor = 80.0\nceiling = 60.0\n",
    );
    sentinel()
        .arg("--config")
        .arg(&path)
        .arg("check-config")
        .env("SENTINEL_TELEGRAM_TOKEN", "123:abc")
        .env("SENTINEL_TELEGRAM_CHAT_ID", "42")
        .assert()
        .code(2);
}

#[test]
fn test_unreadable_config_exits_2() {
    sentinel()
        .args(["--config", "/nonexistent/sentinel.toml", "check-config"])
        .assert()
        .code(2);
}

#[test]
fn test_incidents_empty_history() {
    let dir = tempfile::tempdir().unwrap();
    let history = dir.path().join("incidents.json");
    let path = write_config(
        dir.path(),
        &format!("[history]\nincident_path = {:?}\n", history.to_string_lossy()),
    );
    sentinel()
        .arg("--config")
        .arg(&path)
        .arg("incidents")
        .assert()
        .success()
        .stdout(predicate::str::contains("No incidents recorded."));

    sentinel()
        .arg("--config")
        .arg(&path)
        .args(["incidents", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}
