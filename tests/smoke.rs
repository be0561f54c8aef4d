//! Smoke tests -- verify the binary runs and the CLI surface is wired.

use assert_cmd::Command;
use predicates::prelude::*;

/// Config with the bundled job switched off, so no network or database is
/// touched.
fn no_jobs_config(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("jobwarden.toml");
    std::fs::write(&path, "[disclosure]\nenabled = false\n").unwrap();
    path
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("jobwarden")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Cron job scheduler"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("jobwarden")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("jobwarden"));
}

#[test]
fn test_serve_subcommand_exists() {
    Command::cargo_bin("jobwarden")
        .unwrap()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--bind"));
}

#[test]
fn test_jobs_dry_run_subcommand_exists() {
    Command::cargo_bin("jobwarden")
        .unwrap()
        .args(["jobs", "dry-run", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--hours"));
}

#[test]
fn test_jobs_list_without_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let config = no_jobs_config(&dir);
    Command::cargo_bin("jobwarden")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .args(["jobs", "list"])
        .assert()
        .success()
        .stdout(predicates::str::contains("No jobs configured."));
}

#[test]
fn test_run_unknown_job_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = no_jobs_config(&dir);
    Command::cargo_bin("jobwarden")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .args(["run", "no-such-job"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("job 'no-such-job' not found"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[scheduler]\nretention = 0\n").unwrap();
    Command::cargo_bin("jobwarden")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .args(["jobs", "list"])
        .assert()
        .failure();
}

#[test]
fn test_volumes_on_empty_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobwarden.toml");
    let db = dir.path().join("data/jobwarden.db");
    std::fs::write(
        &path,
        format!("[disclosure]\nenabled = false\ndatabase_path = {:?}\n", db.display().to_string()),
    )
    .unwrap();
    Command::cargo_bin("jobwarden")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .args(["volumes", "--from", "2024-01-01", "--to", "2024-03-31"])
        .assert()
        .success()
        .stdout(predicates::str::contains("No transactions between 2024-01-01 and 2024-03-31."));
    assert!(db.exists());
}
