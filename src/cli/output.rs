//! Output formatting and progress indicators
//!
//! This module provides utilities for displaying progress bars,
//! status lines, and formatted messages to the user.

use std::sync::OnceLock;

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::status::{PackageStatus, StatusEntry};

static OUTPUT: OnceLock<OutputConfig> = OnceLock::new();

/// Global output flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Suppress everything but errors
    pub quiet: bool,
    /// Machine-readable output
    pub json: bool,
    /// Verbosity level (`-v` count)
    pub verbose: u8,
}

impl OutputConfig {
    /// Create an output configuration from the global flags
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Make this configuration visible to all commands
    ///
    /// Only the first call has an effect.
    pub fn apply_global(&self) {
        let _ = OUTPUT.set(*self);
    }

    /// The configuration applied with [`OutputConfig::apply_global`]
    pub fn current() -> Self {
        OUTPUT.get().copied().unwrap_or_default()
    }

    /// Default tracing filter for these flags
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }

    /// Whether human-readable progress should be shown
    pub fn shows_progress(&self) -> bool {
        !self.quiet && !self.json
    }
}

/// Print an error with its chain of causes to stderr
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} Error: {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

/// Create a progress bar for build jobs
pub fn create_build_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} jobs ({msg})")
            .expect("Invalid progress bar template")
            .progress_chars("█▓▒░"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}

/// Prefix for a package status
pub fn status_prefix(status: PackageStatus) -> &'static str {
    match status {
        PackageStatus::Succeeded => status::SUCCESS,
        PackageStatus::Failed | PackageStatus::Broken | PackageStatus::Unresolvable => {
            status::ERROR
        }
        PackageStatus::Blocked => status::WARNING,
        _ => status::INFO,
    }
}

/// One status line for a package
pub fn format_status_line(id: &str, entry: &StatusEntry) -> String {
    match &entry.details {
        Some(details) => format!(
            "{} {id:<24} {:<12} {details}",
            status_prefix(entry.status),
            entry.status.as_str()
        ),
        None => format!("{} {id:<24} {}", status_prefix(entry.status), entry.status),
    }
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}
