//! History command implementation
//!
//! Implements `pkgforge history`, printing the build attempts recorded for
//! one package.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::output::{status, status_prefix, OutputConfig};
use crate::core::config::Overrides;
use crate::core::integrate::History;

/// Execute the history command
pub async fn execute(project_dir: &Path, package: &str) -> Result<()> {
    let settings = super::load_settings(project_dir, &Overrides::default())?;
    let history = History::new(&settings.state_dir);
    let records = history
        .read(package)
        .with_context(|| format!("Failed to read history of {package}"))?;
    let out = OutputConfig::current();

    if out.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{} No builds recorded for {package}", status::INFO);
        return Ok(());
    }

    for record in &records {
        let detail = record
            .detail
            .as_deref()
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        println!(
            "{} {} {:<10} {:>8.1}s  {} on {} [{}]{detail}",
            status_prefix(record.status),
            record.start,
            record.status.as_str(),
            record.duration,
            record.reason,
            record.builder,
            record.arch
        );
    }
    Ok(())
}
