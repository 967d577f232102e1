//! Integration tests for `pkgforge clean`
//!
//! - Default: forget the lastcheck cache so packages are re-evaluated
//! - `--all`: remove the state directory

mod common;

use common::{producing_script, recipe, run_pkgforge, TestProject};

fn setup_built_project() -> TestProject {
    let project = TestProject::new();
    project.add_package("a", &recipe(&[]), &producing_script("a"));
    let output = run_pkgforge(&project, &["build"]);
    assert!(
        output.status.success(),
        "build failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    project
}

#[test]
fn test_clean_removes_lastcheck_only() {
    let project = setup_built_project();
    assert!(project.file_exists("build/_lastcheck"));

    let output = run_pkgforge(&project, &["clean"]);

    assert!(output.status.success());
    assert!(!project.file_exists("build/_lastcheck"));
    assert!(project.file_exists("build/_result"));
    assert!(project.file_exists("build/repo/a/a.bin"));
}

#[test]
fn test_build_after_clean_rebuilds_with_reason() {
    let project = setup_built_project();
    assert!(run_pkgforge(&project, &["clean"]).status.success());

    assert!(run_pkgforge(&project, &["build"]).status.success());

    let history = project.read_file("build/history/a.jsonl");
    assert_eq!(history.lines().count(), 2);
    assert!(history.lines().last().unwrap().contains("\"new build\""));
}

#[test]
fn test_clean_all_removes_state_dir() {
    let project = setup_built_project();

    let output = run_pkgforge(&project, &["clean", "--all"]);

    assert!(output.status.success());
    assert!(!project.file_exists("build"));
    assert!(project.file_exists("packages/a/package.toml"));
}

#[test]
fn test_clean_nothing() {
    let project = TestProject::new();

    let output = run_pkgforge(&project, &["clean"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Nothing to clean"));
}
