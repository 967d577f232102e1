//! Status command implementation
//!
//! Implements `pkgforge status`. Reads only the Result Store, so it can be
//! used while a build is running.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::cli::output::{format_status_line, status, OutputConfig};
use crate::core::config::Overrides;
use crate::core::status::PackageStatus;
use crate::core::store::ResultStore;

/// Execute the status command
pub async fn execute(project_dir: &Path, package: Option<&str>) -> Result<()> {
    let settings = super::load_settings(project_dir, &Overrides::default())?;
    let store = ResultStore::new(&settings.state_dir);
    let statuses = store
        .load()
        .with_context(|| format!("Failed to read {}", store.path().display()))?;
    let out = OutputConfig::current();

    if let Some(id) = package {
        let Some(entry) = statuses.get(id) else {
            bail!("No recorded status for package '{id}'");
        };
        if out.json {
            println!("{}", serde_json::to_string_pretty(entry)?);
        } else {
            println!("{}", format_status_line(id, entry));
        }
        return Ok(());
    }

    if out.json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        println!("{} No build results recorded yet", status::INFO);
        return Ok(());
    }

    for (id, entry) in &statuses {
        println!("{}", format_status_line(id, entry));
    }

    let counts: Vec<String> = PackageStatus::ALL
        .iter()
        .filter_map(|s| {
            let n = statuses.values().filter(|e| e.status == *s).count();
            (n > 0).then(|| format!("{n} {s}"))
        })
        .collect();
    println!("\n{}", counts.join(", "));
    Ok(())
}
