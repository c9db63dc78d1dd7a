//! Command-line surface of the scan-worker binary

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_environment_fallbacks() {
    Command::cargo_bin("scan-worker")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("POLL_SECONDS"))
        .stdout(predicate::str::contains("PIPELINE_COMMAND"))
        .stdout(predicate::str::contains("--once"));
}

#[test]
fn test_missing_connection_settings_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("scan-worker")
        .unwrap()
        .current_dir(dir.path())
        .env_clear()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--database-url"));
}

#[test]
fn test_empty_pipeline_command_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("scan-worker")
        .unwrap()
        .current_dir(dir.path())
        .env_clear()
        .args([
            "--database-url",
            "postgres://localhost/scans",
            "--supabase-url",
            "http://localhost:54321",
            "--service-key",
            "key",
            "--pipeline-command",
            " ",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("command line is empty"));
}
