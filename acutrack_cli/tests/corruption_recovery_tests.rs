//! Corruption recovery tests for acutrack.
//!
//! These tests verify the system can handle:
//! - A corrupted store document (refused, never overwritten)
//! - Corrupted settings and drafts files (fall back to defaults)
//! - Failed saves keeping the draft for a retry

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn cli(data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("acutrack"));
    cmd.env("XDG_CONFIG_HOME", data_dir.join("config"))
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_corrupted_store_is_not_overwritten() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    let store_path = data_dir.join("store.json");
    fs::write(&store_path, "{ invalid json }}}}").expect("Failed to write corrupted store");

    cli(data_dir)
        .args(["patient", "add", "--mrn", "A001", "--name", "Lin", "--gender", "f"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unreadable"));

    assert_eq!(
        fs::read_to_string(&store_path).unwrap(),
        "{ invalid json }}}}"
    );
}

#[test]
fn test_corrupted_settings_use_defaults() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    fs::write(data_dir.join("settings.json"), "not json at all").unwrap();

    cli(data_dir)
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("第十組"))
        .stdout(predicate::str::contains("Acupoints (40)"));
}

#[test]
fn test_corrupted_drafts_are_ignored() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    cli(data_dir)
        .args(["patient", "add", "--mrn", "A001", "--name", "Lin", "--gender", "f"])
        .assert()
        .success();
    fs::write(data_dir.join("drafts.json"), "[[[").unwrap();

    cli(data_dir)
        .args(["session", "tap", "A001", "head"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 1 needles"));
}

#[test]
fn test_failed_save_keeps_draft() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    cli(data_dir)
        .args(["patient", "add", "--mrn", "A001", "--name", "Lin", "--gender", "f"])
        .assert()
        .success();
    cli(data_dir)
        .args(["session", "tap", "A001", "trunk", "--times", "2"])
        .assert()
        .success();

    // Break the store between counting and saving
    let store_path = data_dir.join("store.json");
    let good = fs::read_to_string(&store_path).unwrap();
    fs::write(&store_path, "{ truncated").unwrap();

    cli(data_dir)
        .args(["session", "save", "A001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("try again"));

    // Repair and retry: the counts were not lost
    fs::write(&store_path, good).unwrap();
    cli(data_dir)
        .args(["session", "draft", "A001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 2 needles"));
    cli(data_dir)
        .args(["session", "save", "A001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(2 needles)"));
}
