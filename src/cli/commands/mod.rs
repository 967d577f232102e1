//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod check;
pub mod clean;
pub mod history;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::core::config::{Overrides, ProjectConfig, Settings};

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build all packages that are out of date
    Build {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Number of parallel builders
        #[arg(short = 'j', long)]
        builders: Option<usize>,

        /// Target architecture
        #[arg(long)]
        arch: Option<String>,

        /// Builder root template ("{n}" is replaced by the builder number)
        #[arg(long)]
        root: Option<String>,

        /// Evaluate one pass without starting any build
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what a build would do, without building
    Check {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Target architecture
        #[arg(long)]
        arch: Option<String>,
    },

    /// Show the recorded status of packages
    Status {
        /// Show only this package
        package: Option<String>,

        /// Project directory
        #[arg(short = 'C', long, default_value = ".")]
        dir: PathBuf,
    },

    /// Show the build history of a package
    History {
        /// Package name
        package: String,

        /// Project directory
        #[arg(short = 'C', long, default_value = ".")]
        dir: PathBuf,
    },

    /// Forget cached build decisions
    Clean {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Remove the whole state directory, including built binaries
        #[arg(long)]
        all: bool,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self) -> Result<()> {
        match self {
            Self::Build {
                dir,
                builders,
                arch,
                root,
                dry_run,
            } => {
                let overrides = Overrides {
                    builders,
                    arch,
                    root,
                };
                build::execute(&dir, &overrides, dry_run).await
            }
            Self::Check { dir, arch } => {
                let overrides = Overrides {
                    arch,
                    ..Overrides::default()
                };
                check::execute(&dir, &overrides).await
            }
            Self::Status { dir, package } => status::execute(&dir, package.as_deref()).await,
            Self::History { dir, package } => history::execute(&dir, &package).await,
            Self::Clean { dir, all } => clean::execute(&dir, all).await,
        }
    }
}

/// Load `pkgforge.toml` and resolve the effective settings for `dir`
pub(crate) fn load_settings(dir: &Path, overrides: &Overrides) -> Result<Settings> {
    let project_dir = dir
        .canonicalize()
        .with_context(|| format!("Project directory {} not found", dir.display()))?;
    let config = ProjectConfig::load(&project_dir)
        .with_context(|| format!("Failed to load configuration in {}", project_dir.display()))?;
    config
        .resolve(&project_dir, overrides)
        .with_context(|| "Invalid configuration")
}
