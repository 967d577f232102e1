//! Check command implementation
//!
//! Implements `pkgforge check`: a single dry-run pass that reports what a
//! build would do. Nothing is built and no state is written.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::cli::output::{format_status_line, status, OutputConfig};
use crate::core::config::Overrides;
use crate::core::engine::Engine;
use crate::core::status::PackageStatus;
use crate::infra::executor::CommandExecutor;

/// Execute the check command
pub async fn execute(project_dir: &Path, overrides: &Overrides) -> Result<()> {
    let settings = super::load_settings(project_dir, overrides)?;
    if !settings.packages_dir.is_dir() {
        bail!(
            "No packages directory found at {}",
            settings.packages_dir.display()
        );
    }

    // Never started, so no container runtime is required
    let executor = CommandExecutor::new(settings.jobs);
    let mut engine = Engine::open(&settings, Arc::new(executor))
        .await
        .with_context(|| "Failed to load project")?
        .with_dry_run(true);
    let summary = engine.run().await.with_context(|| "Check failed")?;

    let out = OutputConfig::current();
    if out.json {
        println!("{}", serde_json::to_string_pretty(&summary.statuses)?);
        return Ok(());
    }
    if out.quiet {
        return Ok(());
    }

    for (id, entry) in &summary.statuses {
        println!("{}", format_status_line(id, entry));
    }

    let scheduled = summary.count(PackageStatus::Scheduled);
    if scheduled == 0 {
        println!("\n{} Nothing to build", status::SUCCESS);
    } else {
        println!("\n{} {scheduled} package(s) would be built", status::INFO);
    }
    Ok(())
}
