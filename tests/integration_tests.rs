use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use std::process::{Command, Output};

mod common;
use common::assert_contains_all;

/// Integration tests for emuprep CLI commands
/// These tests run the actual binary and verify its behavior

/// Run the binary against a config file in `temp` whose workspace is `temp/ws`
fn emuprep(temp: &TempDir, args: &[&str]) -> Output {
    let workspace = temp.child("ws");
    workspace.create_dir_all().unwrap();
    let config = temp.child("config.yml");
    if !config.path().exists() {
        config
            .write_str(&format!("workspace: \"{}\"\n", workspace.path().display()))
            .unwrap();
    }

    Command::new(env!("CARGO_BIN_EXE_emuprep"))
        .arg("--config")
        .arg(config.path())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_emuprep"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    // Verify help contains expected commands
    assert_contains_all(
        &stdout,
        &["run", "refresh", "login", "merge", "doctor", "init", "--workspace"],
    );
}

#[test]
fn test_cli_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_emuprep"))
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("emuprep"));
}

#[test]
fn test_run_help_lists_flags() {
    let output = Command::new(env!("CARGO_BIN_EXE_emuprep"))
        .args(["run", "--help"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains_all(&stdout, &["--app-id", "--dll", "--skip-dll", "--force-refresh"]);
}

#[test]
fn test_invalid_app_id_is_rejected() {
    let temp = TempDir::new().unwrap();
    let output = emuprep(&temp, &["run", "--app-id", "portal"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("appid must be numeric"));
}

#[test]
fn test_merge_command() {
    let temp = TempDir::new().unwrap();
    temp.child("src/steam_appid.txt").write_str("480").unwrap();
    temp.child("src/sub/achievements.json").write_str("[]").unwrap();
    temp.child("dst/steam_appid.txt").write_str("10").unwrap();
    temp.child("dst/keep.txt").write_str("keep").unwrap();

    let output = emuprep(
        &temp,
        &[
            "merge",
            temp.child("src").path().to_str().unwrap(),
            temp.child("dst").path().to_str().unwrap(),
        ],
    );

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains_all(&stdout, &["Merged", "New files: 1", "Overwritten files: 1"]);

    temp.child("dst/steam_appid.txt").assert("480");
    temp.child("dst/sub/achievements.json").assert("[]");
    temp.child("dst/keep.txt").assert("keep");
}

#[test]
fn test_merge_command_missing_source() {
    let temp = TempDir::new().unwrap();

    let output = emuprep(
        &temp,
        &[
            "merge",
            temp.child("absent").path().to_str().unwrap(),
            temp.child("dst").path().to_str().unwrap(),
        ],
    );

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains_all(&stdout, &["Merge source not found", "nothing merged"]);
    temp.child("dst").assert(predicate::path::missing());
}

#[test]
fn test_doctor_reports_missing_assets() {
    let temp = TempDir::new().unwrap();
    let output = emuprep(&temp, &["doctor"]);

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains_all(
        &stdout,
        &["Diagnostics", "Emulator Assets", "Some checks failed"],
    );
}

#[test]
fn test_doctor_with_emulator_folder() {
    let temp = TempDir::new().unwrap();
    temp.child("ws/Emu/steam_settings").create_dir_all().unwrap();

    let output = emuprep(&temp, &["--verbose", "doctor"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains_all(&stdout, &["Emulator folder present", "All checks passed"]);
}

#[test]
fn test_workspace_flag_overrides_config() {
    let temp = TempDir::new().unwrap();
    temp.child("other/Emu").create_dir_all().unwrap();
    let other = temp.child("other");

    let output = emuprep(
        &temp,
        &["--workspace", other.path().to_str().unwrap(), "doctor"],
    );

    assert!(output.status.success());
}

#[test]
fn test_init_writes_config() {
    let temp = TempDir::new().unwrap();
    let config = temp.child("fresh/config.yml");

    let output = Command::new(env!("CARGO_BIN_EXE_emuprep"))
        .arg("--config")
        .arg(config.path())
        .arg("--workspace")
        .arg(temp.path())
        .arg("init")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("initialized successfully"));
    config.assert(predicate::str::contains(temp.path().to_str().unwrap()));
    config.assert(predicate::str::contains("retention: 7d"));
}

#[test]
fn test_init_keeps_existing_config() {
    let temp = TempDir::new().unwrap();
    let config = temp.child("config.yml");
    config.write_str("workspace: \"/tmp\"\n").unwrap();

    let output = emuprep(&temp, &["init"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("already exists"));
    config.assert("workspace: \"/tmp\"\n");
}

#[test]
fn test_error_handling_invalid_config() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.child("invalid-config.yml");

    // Create an invalid config file
    config_path.write_str("invalid: yaml: content: [").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_emuprep"))
        .arg("--config")
        .arg(config_path.path())
        .arg("doctor")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("parse") || stderr.contains("config"));
}

#[test]
fn test_invalid_retention_is_rejected() {
    let temp = TempDir::new().unwrap();
    temp.child("config.yml")
        .write_str("refresh:\n  retention: \"soon\"\n")
        .unwrap();

    let output = emuprep(&temp, &["doctor"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("retention"));
}
