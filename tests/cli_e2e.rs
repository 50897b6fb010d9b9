//! End-to-end CLI tests for the fetchline binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("fetchline").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Fetch every URL"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("fetchline").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetchline"));
}

/// Test that missing positional arguments cause non-zero exit.
#[test]
fn test_binary_without_arguments_returns_error() {
    let mut cmd = Command::cargo_bin("fetchline").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let mut cmd = Command::cargo_bin("fetchline").unwrap();
    cmd.args(["urls.txt", "out.jsonl", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that a missing input file fails the run.
#[test]
fn test_binary_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("fetchline").unwrap();
    cmd.arg(dir.path().join("absent.txt"))
        .arg(dir.path().join("out.jsonl"))
        .arg("-q")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot open URL input"));
}

/// Test that an unknown key in the config file is rejected.
#[test]
fn test_binary_rejects_bad_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("fetchline.toml");
    std::fs::write(&config, "max_concurrency = 3\n").unwrap();
    std::fs::write(dir.path().join("urls.txt"), "").unwrap();

    let mut cmd = Command::cargo_bin("fetchline").unwrap();
    cmd.arg(dir.path().join("urls.txt"))
        .arg(dir.path().join("out.jsonl"))
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading config"));
}

/// Test that an empty input file succeeds with an all-zero summary.
#[test]
fn test_binary_empty_input_prints_summary() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("urls.txt"), "\n").unwrap();

    let mut cmd = Command::cargo_bin("fetchline").unwrap();
    cmd.arg(dir.path().join("urls.txt"))
        .arg(dir.path().join("out.jsonl"))
        .arg("-q")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "succeeded=0 failed=0 retried=0 spilled=0",
        ));
}

/// Test a full run against a mock server, with a config file and flag overrides.
#[tokio::test]
async fn test_binary_fetches_urls_and_writes_records() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/json")
                .set_body_bytes(br#"{"a":1}"#.to_vec()),
        )
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("urls.txt");
    let output = dir.path().join("out.jsonl");
    let config = dir.path().join("fetchline.toml");
    std::fs::write(
        &input,
        format!("{0}/a.json\n{0}/a.json\nftp://nope/x\n", mock_server.uri()),
    )
    .unwrap();
    std::fs::write(&output, "stale\n").unwrap();
    std::fs::write(&config, "max_retries = 1\nbase_retry_delay_seconds = 0.0\n").unwrap();

    let assert = tokio::task::spawn_blocking(move || {
        Command::cargo_bin("fetchline")
            .unwrap()
            .arg(&input)
            .arg(&output)
            .arg("--config")
            .arg(&config)
            .args(["--clear", "-c", "2", "-q"])
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("succeeded=2 failed=1"));

    let text = std::fs::read_to_string(dir.path().join("out.jsonl")).unwrap();
    let records: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 3);
    assert_eq!(
        records
            .iter()
            .filter(|r| r["content"] == serde_json::json!({"a": 1}))
            .count(),
        2
    );
    assert!(records.iter().any(|r| r["status_code"] == 0));
}
