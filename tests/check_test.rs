//! Integration tests for `pkgforge check`
//!
//! - Reports what a build would do without building
//! - Writes no state

mod common;

use common::{producing_script, recipe, run_pkgforge, TestProject};

#[test]
fn test_check_reports_scheduled_and_blocked() {
    let project = TestProject::new();
    project.add_package("a", &recipe(&["b"]), &producing_script("a"));
    project.add_package("b", &recipe(&[]), &producing_script("b"));

    let output = run_pkgforge(&project, &["check"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("waiting for b"));
    assert!(stdout.contains("1 package(s) would be built"));
    assert!(!project.file_exists("build"));
}

#[test]
fn test_check_json() {
    let project = TestProject::new();
    project.add_package("a", &recipe(&[]), &producing_script("a"));
    project.add_package(
        "skip",
        "[package]\nversion = \"1\"\n\n[build]\ndirective = \"disabled\"\n",
        "exit 1\n",
    );

    let output = run_pkgforge(&project, &["--json", "check"]);

    assert!(output.status.success());
    let statuses: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(statuses["a"]["status"], "scheduled");
    assert_eq!(statuses["skip"]["status"], "disabled");
}

#[test]
fn test_check_after_build_has_nothing_to_do() {
    let project = TestProject::new();
    project.add_package("a", &recipe(&[]), &producing_script("a"));
    assert!(run_pkgforge(&project, &["build"]).status.success());

    let output = run_pkgforge(&project, &["check"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Nothing to build"));
}

#[test]
fn test_unsupported_arch_is_excluded() {
    let project = TestProject::new();
    project.add_package(
        "a",
        "[package]\nversion = \"1\"\narch = [\"riscv64\"]\n",
        "exit 0\n",
    );

    let output = run_pkgforge(&project, &["--json", "check", "--arch", "x86_64"]);

    assert!(output.status.success());
    let statuses: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(statuses["a"]["status"], "excluded");
}
