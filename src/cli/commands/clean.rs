//! Clean command implementation
//!
//! Implements `pkgforge clean`. By default only the lastcheck cache is
//! removed, so the next build re-evaluates every package; `--all` removes
//! the whole state directory.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::output::{status, OutputConfig};
use crate::core::config::Overrides;
use crate::core::store::LastcheckStore;
use crate::infra::filesystem;

/// Execute the clean command
pub async fn execute(project_dir: &Path, all: bool) -> Result<()> {
    let settings = super::load_settings(project_dir, &Overrides::default())?;
    let quiet = OutputConfig::current().quiet;

    if all {
        if !settings.state_dir.exists() {
            if !quiet {
                println!("{} Nothing to clean", status::SUCCESS);
            }
            return Ok(());
        }
        filesystem::remove_dir_all(&settings.state_dir).with_context(|| {
            format!("Failed to remove {}", settings.state_dir.display())
        })?;
        if !quiet {
            println!(
                "{} Removed {}",
                status::SUCCESS,
                settings.state_dir.display()
            );
        }
        return Ok(());
    }

    let store = LastcheckStore::new(&settings.state_dir);
    let removed = store
        .clear()
        .with_context(|| format!("Failed to remove {}", store.path().display()))?;
    if !quiet {
        if removed {
            println!("{} Cleared the build cache", status::SUCCESS);
        } else {
            println!("{} Nothing to clean", status::SUCCESS);
        }
    }
    Ok(())
}
