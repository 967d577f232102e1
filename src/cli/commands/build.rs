//! Build command implementation
//!
//! Implements `pkgforge build`: run the engine until every package reached
//! a final state for this run.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::cli::output::{self, format_status_line, status, OutputConfig};
use crate::core::config::Overrides;
use crate::core::engine::{Engine, EngineEvent, RunSummary};
use crate::core::status::PackageStatus;
use crate::infra::executor::CommandExecutor;

/// Execute the build command
pub async fn execute(project_dir: &Path, overrides: &Overrides, dry_run: bool) -> Result<()> {
    let settings = super::load_settings(project_dir, overrides)?;
    if !settings.packages_dir.is_dir() {
        bail!(
            "No packages directory found at {}",
            settings.packages_dir.display()
        );
    }

    let executor = CommandExecutor::from_settings(&settings)
        .with_context(|| "Failed to set up the build executor")?;

    tracing::info!(
        "Building {} with {} builder(s) for {}",
        settings.project_dir.display(),
        settings.builders,
        settings.arch
    );

    let out = OutputConfig::current();
    let mut engine = Engine::open(&settings, Arc::new(executor))
        .await
        .with_context(|| "Failed to load project")?
        .with_dry_run(dry_run);

    let bar = out.shows_progress().then(output::create_build_bar);
    if let Some(bar) = &bar {
        let bar = bar.clone();
        engine = engine.with_observer(Box::new(move |event: &EngineEvent<'_>| match event {
            EngineEvent::JobStarted { package, builder } => {
                bar.inc_length(1);
                bar.set_message(format!("{package} on {builder}"));
            }
            EngineEvent::JobFinished { package, status } => {
                bar.inc(1);
                bar.println(format!(
                    "{} {package} {status}",
                    output::status_prefix(*status)
                ));
            }
            EngineEvent::Pass { .. } => {}
        }));
    }

    let result = engine.run().await;
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }
    let summary = result.with_context(|| "Build did not complete")?;

    report(&summary, &out)?;

    let failed = summary.count(PackageStatus::Failed);
    if failed > 0 {
        bail!("{failed} package(s) failed to build");
    }
    Ok(())
}

fn report(summary: &RunSummary, out: &OutputConfig) -> Result<()> {
    if out.json {
        println!("{}", serde_json::to_string_pretty(&summary.statuses)?);
        return Ok(());
    }
    if out.quiet {
        return Ok(());
    }

    for (id, entry) in &summary.statuses {
        if entry.status != PackageStatus::Succeeded {
            println!("{}", format_status_line(id, entry));
        }
    }

    println!(
        "\n{} {} succeeded, {} failed, {} blocked, {} scheduled ({} job(s), {} pass(es))",
        status::INFO,
        summary.count(PackageStatus::Succeeded),
        summary.count(PackageStatus::Failed),
        summary.count(PackageStatus::Blocked),
        summary.count(PackageStatus::Scheduled),
        summary.jobs,
        summary.passes
    );
    Ok(())
}
