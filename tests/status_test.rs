//! Integration tests for `pkgforge status`
//!
//! - Reads the Result Store only
//! - `--json` output and single-package queries

mod common;

use common::{producing_script, recipe, run_pkgforge, TestProject};

fn setup_built_project() -> TestProject {
    let project = TestProject::new();
    project.add_package("a", &recipe(&[]), &producing_script("a"));
    project.add_package("b", &recipe(&[]), "exit 3\n");
    let output = run_pkgforge(&project, &["build", "-j", "2"]);
    assert!(!output.status.success(), "b is expected to fail");
    project
}

#[test]
fn test_status_lists_packages() {
    let project = setup_built_project();

    let output = run_pkgforge(&project, &["status"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("succeeded"));
    assert!(stdout.contains("exit status 3"));
    assert!(stdout.contains("1 succeeded, 1 failed"));
}

#[test]
fn test_status_of_one_package_json() {
    let project = setup_built_project();

    let output = run_pkgforge(&project, &["--json", "status", "b"]);

    assert!(output.status.success());
    let entry: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(entry["status"], "failed");
    assert_eq!(entry["details"], "exit status 3");
}

#[test]
fn test_status_reads_result_store_verbatim() {
    let project = TestProject::new();
    project.create_file(
        "build/_result",
        r#"{"x": {"status": "building", "details": "builder1"}}"#,
    );

    let output = run_pkgforge(&project, &["--json", "status"]);

    assert!(output.status.success());
    let statuses: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(statuses["x"]["details"], "builder1");
}

#[test]
fn test_unknown_package_fails() {
    let project = setup_built_project();

    let output = run_pkgforge(&project, &["status", "nope"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope"));
}

#[test]
fn test_status_without_results() {
    let project = TestProject::new();

    let output = run_pkgforge(&project, &["status", "-C", "."]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No build results"));
}
