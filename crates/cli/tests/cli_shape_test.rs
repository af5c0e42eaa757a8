use std::{fs, process::Command};

use tempfile::tempdir;

fn run_applyalter(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_applyalter"))
        .args(args)
        .output()
        .unwrap_or_else(|error| panic!("failed to run applyalter: {error}"))
}

#[test]
fn missing_arguments_are_a_usage_error() {
    let output = run_applyalter(&[]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage: applyalter"), "got: {stderr}");
    assert!(stderr.contains("<DBCONFIG>"), "got: {stderr}");
}

#[test]
fn help_lists_enabled_engines() {
    let output = run_applyalter(&["--help"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Engines: "), "got: {stdout}");
    assert!(stdout.contains("db2"), "got: {stdout}");
    assert!(stdout.contains("oracle"), "got: {stdout}");
    #[cfg(feature = "sqlite")]
    assert!(stdout.contains("sqlite"), "got: {stdout}");
}

#[test]
fn unknown_run_mode_is_rejected_by_the_parser() {
    let output = run_applyalter(&["-r", "shadow", "db.yaml", "a.yaml"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown run mode `shadow`"), "got: {stderr}");
}

#[test]
fn missing_username_is_a_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_applyalter"))
        .args(["db.yaml", "a.yaml"])
        .env_remove("USER")
        .env_remove("USERNAME")
        .output()
        .unwrap_or_else(|error| panic!("failed to run applyalter: {error}"));

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("[usage] "), "got: {stderr}");
    assert!(stderr.contains("--username"), "got: {stderr}");
}

#[test]
fn unreadable_database_configuration_is_an_io_error() {
    let tempdir = tempdir().unwrap_or_else(|error| panic!("failed to create tempdir: {error}"));
    let missing = tempdir.path().join("missing.yaml");
    let missing = missing.to_string_lossy().into_owned();

    let output = run_applyalter(&["-u", "tester", missing.as_str(), "a.yaml"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[io]"), "got: {stderr}");
    assert!(
        stderr.contains("while loading database configuration"),
        "got: {stderr}"
    );
}

#[test]
fn unknown_engine_is_a_config_error() {
    let tempdir = tempdir().unwrap_or_else(|error| panic!("failed to create tempdir: {error}"));
    let dbconfig = tempdir.path().join("db.yaml");
    fs::write(
        &dbconfig,
        "instances:\n  - id: legacy\n    engine: mssql\n    database: app\n",
    )
    .unwrap_or_else(|error| panic!("failed to write db.yaml: {error}"));
    let dbconfig = dbconfig.to_string_lossy().into_owned();

    let output = run_applyalter(&["-u", "tester", dbconfig.as_str(), "a.yaml"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[config]"), "got: {stderr}");
    assert!(
        stderr.contains("unknown database engine `mssql`"),
        "got: {stderr}"
    );
}
