//! CLI tests for the `rq` binary

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{NamedTempFile, TempDir};

const CONFIG: &str = r#"
default:
  max-concurrent: 4
targets:
  tiny:
    max-concurrent: 2
    rate-limit-count: 100
    rate-window-ms: 1000
    timeout-ms: 100
    abort-on-timeout: true
"#;

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create config file");
    file.write_all(content.as_bytes()).expect("Failed to write config file");
    file
}

/// `rq` with logs redirected into a scratch data dir
fn rq(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rq").expect("rq binary not built");
    cmd.env("XDG_DATA_HOME", data_dir.path()).env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_config_prints_effective_json() {
    let data_dir = TempDir::new().unwrap();
    let config = config_file(CONFIG);

    rq(&data_dir)
        .args(["config", "--format", "json", "--config"])
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tiny\""))
        .stdout(predicate::str::contains("\"max-concurrent\": 2"))
        .stdout(predicate::str::contains("\"abort-on-timeout\": true"));
}

#[test]
fn test_config_rejects_zero_limits() {
    let data_dir = TempDir::new().unwrap();
    let config = config_file("targets:\n  broken:\n    rate-limit-count: 0\n");

    rq(&data_dir)
        .args(["config", "--config"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("rate-limit-count must be greater than zero"));
}

#[test]
fn test_targets_lists_limits() {
    let data_dir = TempDir::new().unwrap();
    let config = config_file(CONFIG);

    rq(&data_dir)
        .args(["targets", "--config"])
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("tiny"))
        .stdout(predicate::str::contains("100/1000ms"));
}

#[test]
fn test_simulate_reports_each_outcome() {
    let data_dir = TempDir::new().unwrap();
    let config = config_file(CONFIG);

    let output = rq(&data_dir)
        .args([
            "simulate",
            "--target",
            "tiny",
            "-n",
            "6",
            "--work-ms",
            "5",
            "--fail-every",
            "2",
            "--hang-every",
            "3",
            "--format",
            "json",
            "--config",
        ])
        .arg(config.path())
        .output()
        .expect("Failed to run rq simulate");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let outcomes: Vec<&str> = report["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["outcome"].as_str().unwrap())
        .collect();
    // 3 and 6 hang past the timeout; 2 and 4 fail
    assert_eq!(
        outcomes,
        vec!["resolved", "failed", "timed-out", "failed", "resolved", "timed-out"]
    );

    assert_eq!(report["target"], "tiny");
    assert_eq!(report["status"]["total"], 0);
    assert_eq!(report["status"]["stats"]["total_dispatched"], 6);
    assert_eq!(report["status"]["stats"]["total_timed_out"], 2);
}

#[test]
fn test_simulate_text_output() {
    let data_dir = TempDir::new().unwrap();
    let config = config_file(CONFIG);

    rq(&data_dir)
        .args(["simulate", "--target", "tiny", "-n", "3", "--work-ms", "1", "--config"])
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Simulation against 'tiny'"))
        .stdout(predicate::str::contains("3 resolved"));
}
