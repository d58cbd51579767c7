//! CLI integration tests for sweeper.
//!
//! These tests verify command-line argument parsing, help output,
//! exit codes, and a few complete runs against a mock HTTP server.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Get a command for the sweeper binary.
fn cmd() -> Command {
    Command::cargo_bin("sweeper").unwrap()
}

/// Write a config with a static source, a local destination and a file ledger.
fn write_config(dir: &Path, items: &[(&str, String)]) -> std::path::PathBuf {
    let mut yaml = format!(
        "main:\n  staging_dir: {}\n  ledger:\n    backend: file\n    path: {}\njobs:\n  sync:\n    source:\n      type: static\n      items:\n",
        dir.join("staging").display(),
        dir.join("ledger.json").display(),
    );
    if items.is_empty() {
        yaml = yaml.replace("      items:\n", "      items: []\n");
    }
    for (name, url) in items {
        yaml.push_str(&format!("        - name: {}\n          url: {}\n", name, url));
    }
    yaml.push_str(&format!(
        "    destinations:\n      - type: local\n        dir: {}\n",
        dir.join("out").display()
    ));

    let path = dir.join("jobs.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sweeper"));
}

#[test]
fn test_history_subcommand_help() {
    cmd()
        .args(["history", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--limit"))
        .stdout(predicate::str::contains("[default: 10]"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_and_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("[default: jobs.yaml]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_run_requires_job_name() {
    cmd()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<JOB>"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 2)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_2() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "check"])
        .assert()
        .code(2);
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "check"])
        .assert()
        .code(2);
}

#[test]
fn test_empty_config_exits_with_code_2() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "check"])
        .assert()
        .code(2);
}

#[test]
fn test_job_without_destination_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "jobs:").unwrap();
    writeln!(file, "  sync:").unwrap();
    writeln!(file, "    source:").unwrap();
    writeln!(file, "      type: static").unwrap();
    writeln!(file, "      items: []").unwrap();
    writeln!(file, "    destinations: []").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("destination"));
}

#[test]
fn test_unknown_adapter_type_exits_with_code_2() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &[]);
    let yaml = std::fs::read_to_string(&config)
        .unwrap()
        .replace("type: local", "type: gopher");
    std::fs::write(&config, yaml).unwrap();

    cmd()
        .args(["--config", config.to_str().unwrap(), "check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown destination type 'gopher'"));
}

#[test]
fn test_unknown_job_exits_with_code_2() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &[]);

    cmd()
        .args(["--config", config.to_str().unwrap(), "run", "nope"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nope"));
}

// =============================================================================
// Command Tests
// =============================================================================

#[test]
fn test_check_lists_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &[]);

    cmd()
        .args(["--config", config.to_str().unwrap(), "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK: 1 job(s)"))
        .stdout(predicate::str::contains("sync: static -> local"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_then_history() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &[("a.zip", format!("{}/a.zip", server.uri()))]);
    let config = config.to_str().unwrap();

    let output = cmd()
        .args(["--config", config, "--output-json", "run", "sync"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "completed");
    assert_eq!(result["transferred"], 1);
    assert_eq!(result["bytes"], 7);
    assert_eq!(
        std::fs::read(dir.path().join("out").join("a.zip")).unwrap(),
        b"payload"
    );

    // Same content again: nothing transferred
    let output = cmd()
        .args(["--config", config, "--output-json", "run", "sync"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["unchanged"], 1);
    assert_eq!(result["transferred"], 0);

    let output = cmd()
        .args(["--config", config, "--output-json", "history", "sync"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let history: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(history["runs"].as_array().unwrap().len(), 2);
    assert_eq!(history["resources"][0]["name"], "a.zip");
    assert_eq!(history["resources"][0]["size"], 7);

    cmd()
        .args(["--config", config, "history", "sync", "--limit", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Runs of sync:"))
        .stdout(predicate::str::contains("completed"))
        .stdout(predicate::str::contains("a.zip size=7"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_partial_errors_exit_zero() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b.zip"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        &[
            ("a.zip", format!("{}/a.zip", server.uri())),
            ("b.zip", format!("{}/b.zip", server.uri())),
        ],
    );

    cmd()
        .args(["--config", config.to_str().unwrap(), "run", "sync"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Job completed with errors"))
        .stdout(predicate::str::contains("b.zip"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fatal_listing_error_exits_with_code_1() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &[]);
    let yaml = std::fs::read_to_string(&config).unwrap().replace(
        "      type: static\n      items: []\n",
        &format!("      type: http_json\n      url: {}/list.json\n", server.uri()),
    );
    std::fs::write(&config, yaml).unwrap();

    cmd()
        .args(["--config", config.to_str().unwrap(), "run", "sync"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("503"));
}
