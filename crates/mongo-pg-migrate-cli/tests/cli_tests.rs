//! CLI integration tests for mongo-pg-migrate.
//!
//! These tests verify command-line argument parsing, help output, exit
//! codes, and the dry-run pipeline (which needs no live database).

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::TempDir;

/// Get a command for the mongo-pg-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("mongo-pg-migrate").unwrap()
}

/// Write a config pointing at an export dir inside `dir`.
fn write_fixture(dir: &TempDir) -> std::path::PathBuf {
    let export = dir.path().join("export");
    std::fs::create_dir(&export).unwrap();

    let mut tenants = std::fs::File::create(export.join("tenants.jsonl")).unwrap();
    writeln!(
        tenants,
        r#"{{"_id": "{:024x}", "name": "Initech", "plan": "growth"}}"#,
        1
    )
    .unwrap();

    let mut users = std::fs::File::create(export.join("users.jsonl")).unwrap();
    writeln!(
        users,
        r#"{{"_id": "{:024x}", "tenantId": "{:024x}", "email": "a@initech.test"}}"#,
        2, 1
    )
    .unwrap();
    writeln!(
        users,
        r#"{{"_id": "{:024x}", "tenantId": "{:024x}", "email": "b@initech.test"}}"#,
        3, 1
    )
    .unwrap();

    let config_path = dir.path().join("config.yaml");
    std::fs::write(
        &config_path,
        format!(
            r#"source:
  dir: {}
target:
  host: localhost
  database: crm
  user: migrate
  password: secret
migration:
  checkpoint_file: {}
  error_log: {}
  report_file: {}
"#,
            export.display(),
            dir.path().join("migration-state.json").display(),
            dir.path().join("migration-errors.log").display(),
            dir.path().join("validation-report.json").display(),
        ),
    )
    .unwrap();
    config_path
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
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--clean"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mongo-pg-migrate"));
}

#[test]
fn test_global_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

// =============================================================================
// Error Paths
// =============================================================================

#[test]
fn test_missing_subcommand_fails() {
    cmd().assert().failure();
}

#[test]
fn test_missing_config_file_fails() {
    cmd()
        .args(["--config", "/nonexistent/config.yaml", "run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_invalid_config_exits_with_config_code() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.yaml");
    std::fs::write(&config_path, "source: {dir: /tmp}\n").unwrap();

    cmd()
        .args(["--config", config_path.to_str().unwrap(), "run"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_validate_without_checkpoint_exits_with_checkpoint_code() {
    let dir = TempDir::new().unwrap();
    let config_path = write_fixture(&dir);

    cmd()
        .args(["--config", config_path.to_str().unwrap(), "validate"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("No checkpoint found"));
}

// =============================================================================
// Dry Run (full pipeline, no database)
// =============================================================================

#[test]
fn test_dry_run_migrates_without_writing_anything_durable() {
    let dir = TempDir::new().unwrap();
    let config_path = write_fixture(&dir);

    cmd()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "--output-json",
            "run",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_records_migrated\": 3"))
        .stdout(predicate::str::contains("\"total_errors\": 0"));

    // Dry run leaves no checkpoint behind.
    assert!(!dir.path().join("migration-state.json").exists());
}

#[test]
fn test_dry_run_text_summary() {
    let dir = TempDir::new().unwrap();
    let config_path = write_fixture(&dir);

    cmd()
        .args(["--config", config_path.to_str().unwrap(), "run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run completed!"))
        .stdout(predicate::str::contains("Records: 3"));
}
