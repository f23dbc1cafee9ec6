//! Integration tests for the opal CLI binary.

use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Test context that sets up a temporary opal home environment
struct TestContext {
    temp_dir: TempDir,
    opal_home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let opal_home = temp_dir.path().join(".opal");
        std::fs::create_dir_all(&opal_home).expect("failed to create opal home");

        Self {
            temp_dir,
            opal_home,
        }
    }

    fn opal_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_opal");
        let mut cmd = Command::new(bin_path);
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("OPAL_HOME", &self.opal_home);
        cmd
    }
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx
        .opal_cmd()
        .arg("--help")
        .output()
        .expect("failed to run opal");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx
        .opal_cmd()
        .arg("--version")
        .output()
        .expect("failed to run opal");
    assert!(output.status.success());
}

#[test]
fn test_trust_list_starts_empty() {
    let ctx = TestContext::new();
    let output = ctx
        .opal_cmd()
        .args(["trust", "list"])
        .output()
        .expect("failed to run opal trust list");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No trusted keys"));
}

#[test]
fn test_store_list_starts_empty() {
    let ctx = TestContext::new();
    let output = ctx
        .opal_cmd()
        .args(["store", "list"])
        .output()
        .expect("failed to run opal store list");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Store is empty"));
}

#[test]
fn test_run_requires_uri_or_selections() {
    let ctx = TestContext::new();
    let output = ctx
        .opal_cmd()
        .arg("run")
        .output()
        .expect("failed to run opal run");
    assert!(!output.status.success());
}

#[test]
fn test_dry_run_from_saved_selections() {
    let ctx = TestContext::new();

    // A local implementation with a real entry point, referenced through
    // a saved selection document: no network, no solving.
    let impl_dir = ctx.temp_dir.path().join("impl");
    std::fs::create_dir_all(impl_dir.join("bin")).expect("failed to create impl dir");
    std::fs::write(impl_dir.join("bin/hello"), "#!/bin/sh\necho hi\n")
        .expect("failed to write entry point");

    let selections = serde_json::json!({
        "interface": "https://apps.example.net/hello.json",
        "selections": {
            "https://apps.example.net/hello.json": {
                "id": impl_dir.to_string_lossy(),
                "version": "1.0",
                "main": "bin/hello"
            }
        }
    });
    let selections_path = ctx.temp_dir.path().join("hello.selections.json");
    std::fs::write(&selections_path, selections.to_string()).expect("failed to write selections");

    let output = ctx
        .opal_cmd()
        .args(["run", "--dry-run", "--selections"])
        .arg(&selections_path)
        .output()
        .expect("failed to run opal run --dry-run");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        output.status.success(),
        "dry run failed: {stdout}\n{stderr}"
    );
    assert!(stdout.contains("Would execute:"));
    assert!(stdout.contains("bin/hello"));
}

#[test]
fn test_missing_entry_point_is_a_clean_error() {
    let ctx = TestContext::new();

    let impl_dir = ctx.temp_dir.path().join("impl");
    std::fs::create_dir_all(&impl_dir).expect("failed to create impl dir");

    let selections = serde_json::json!({
        "interface": "https://apps.example.net/hello.json",
        "selections": {
            "https://apps.example.net/hello.json": {
                "id": impl_dir.to_string_lossy(),
                "version": "1.0",
                "main": "bin/ghost"
            }
        }
    });
    let selections_path = ctx.temp_dir.path().join("hello.selections.json");
    std::fs::write(&selections_path, selections.to_string()).expect("failed to write selections");

    let output = ctx
        .opal_cmd()
        .args(["run", "--dry-run", "--selections"])
        .arg(&selections_path)
        .output()
        .expect("failed to run opal run");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bin/ghost"));
    assert!(stderr.contains("does not exist"));
}
