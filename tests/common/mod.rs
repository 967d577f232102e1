//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test project
    #[allow(dead_code)]
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the test project
    #[allow(dead_code)]
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    #[allow(dead_code)]
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Add a package with a recipe and a build script
    pub fn add_package(&self, id: &str, recipe: &str, script: &str) {
        self.create_file(&format!("packages/{id}/package.toml"), recipe);
        self.create_file(&format!("packages/{id}/build.sh"), script);
    }

    /// Parsed Result Store
    #[allow(dead_code)]
    pub fn results(&self) -> serde_json::Value {
        serde_json::from_str(&self.read_file("build/_result")).expect("Result Store is not JSON")
    }

    /// Recorded status of one package
    #[allow(dead_code)]
    pub fn status_of(&self, id: &str) -> String {
        self.results()[id]["status"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Run pkgforge inside the project directory
#[allow(dead_code)]
pub fn run_pkgforge(project: &TestProject, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pkgforge"));
    cmd.current_dir(project.path());
    cmd.env_remove("RUST_LOG");
    cmd.env("PKGFORGE_CACHE_DIR", project.path().join(".cache"));
    for arg in args {
        cmd.arg(arg);
    }
    cmd.output().expect("Failed to execute pkgforge")
}

/// Recipe with the given dependency expressions
#[allow(dead_code)]
pub fn recipe(depends: &[&str]) -> String {
    let deps = depends
        .iter()
        .map(|d| format!("\"{d}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!("[package]\nversion = \"1.0.0\"\ndepends = [{deps}]\n")
}

/// Build script producing `<id>.bin` in the result directory
#[allow(dead_code)]
pub fn producing_script(id: &str) -> String {
    format!("echo \"built {id}\"\necho {id} > \"$DESTDIR/{id}.bin\"\n")
}
