//! Project configuration
//!
//! Reads `pkgforge.toml` from the project directory and layers it between
//! command-line overrides and built-in defaults. A missing file means
//! defaults only.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::repository::RepoKind;
use crate::error::ConfigError;
use crate::infra::dirs::PkgforgeDirs;

/// Contents of `pkgforge.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Container isolation; builds run on the host when absent
    #[serde(default)]
    pub container: Option<ContainerConfig>,

    /// Cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Remote binary sources, in pool order
    #[serde(default, rename = "repository")]
    pub repositories: Vec<RepositoryConfig>,
}

/// `[build]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Target architecture
    pub arch: Option<String>,

    /// Number of builder slots
    pub builders: Option<usize>,

    /// Builder root template
    pub root: Option<String>,

    /// Directory holding package directories
    pub packages_dir: Option<PathBuf>,

    /// State directory
    pub state_dir: Option<PathBuf>,

    /// Passes a cycle may go without progress
    pub max_cycle_passes: Option<u32>,

    /// Parallelism passed to build scripts
    pub jobs: Option<usize>,
}

/// `[container]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// `auto`, `docker` or `podman`
    pub runtime: Option<String>,

    /// Image builds run in
    pub image: Option<String>,

    /// Allow network access
    pub network: Option<bool>,
}

/// `[cache]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Snapshot cache directory
    pub dir: Option<PathBuf>,
}

/// One `[[repository]]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryConfig {
    /// Source name
    pub name: String,

    /// `repo` or `registry`
    pub kind: RepoKind,

    /// HTTP base URL
    #[serde(default)]
    pub url: Option<String>,

    /// Local directory holding the index file
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `--builders`
    pub builders: Option<usize>,
    /// `--arch`
    pub arch: Option<String>,
    /// `--root`
    pub root: Option<String>,
}

/// Container settings after defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSettings {
    /// `auto`, `docker` or `podman`
    pub runtime: String,
    /// Image
    pub image: String,
    /// Network access
    pub network: bool,
}

/// Effective settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    /// Project directory
    pub project_dir: PathBuf,
    /// Target architecture
    pub arch: String,
    /// Builder slots
    pub builders: usize,
    /// Builder root template (absolute)
    pub root_template: String,
    /// Packages directory (absolute)
    pub packages_dir: PathBuf,
    /// State directory (absolute)
    pub state_dir: PathBuf,
    /// Cycle stall limit
    pub max_cycle_passes: u32,
    /// Parallelism passed to build scripts
    pub jobs: usize,
    /// Container isolation
    pub container: Option<ContainerSettings>,
    /// Snapshot cache directories
    pub dirs: PkgforgeDirs,
    /// Remote sources
    pub repositories: Vec<RepositoryConfig>,
}

impl Settings {
    /// Local repository directory
    pub fn repo_dir(&self) -> PathBuf {
        self.state_dir.join(defaults::REPO_DIR)
    }
}

impl ProjectConfig {
    /// Load `pkgforge.toml` from `project_dir`
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        Self::load_from_path(&project_dir.join(defaults::CONFIG_FILE))
    }

    /// Load configuration from a specific path
    ///
    /// A missing file yields the default configuration.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Apply overrides and defaults
    ///
    /// Priority: CLI flags > `pkgforge.toml` > defaults.
    pub fn resolve(&self, project_dir: &Path, overrides: &Overrides) -> Result<Settings, ConfigError> {
        let builders = overrides
            .builders
            .or(self.build.builders)
            .unwrap_or(defaults::DEFAULT_BUILDERS);
        if builders > defaults::MAX_BUILDERS {
            tracing::warn!(
                "{} builders requested, capping at {}",
                builders,
                defaults::MAX_BUILDERS
            );
        }
        let builders = builders.clamp(1, defaults::MAX_BUILDERS);

        let max_cycle_passes = self
            .build
            .max_cycle_passes
            .unwrap_or(defaults::MAX_CYCLE_PASSES);
        if max_cycle_passes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "build.max_cycle_passes".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let container = self
            .container
            .as_ref()
            .map(|c| {
                let runtime = c.runtime.clone().unwrap_or_else(|| "auto".to_string());
                if !matches!(runtime.as_str(), "auto" | "docker" | "podman") {
                    return Err(ConfigError::InvalidValue {
                        key: "container.runtime".to_string(),
                        message: format!("unknown runtime '{runtime}'"),
                    });
                }
                Ok(ContainerSettings {
                    runtime,
                    image: c
                        .image
                        .clone()
                        .unwrap_or_else(|| defaults::CONTAINER_IMAGE.to_string()),
                    network: c.network.unwrap_or(false),
                })
            })
            .transpose()?;

        for repo in &self.repositories {
            if repo.kind == RepoKind::Local {
                return Err(ConfigError::InvalidValue {
                    key: format!("repository.{}.kind", repo.name),
                    message: "only 'repo' and 'registry' sources can be configured".to_string(),
                });
            }
        }

        let root = overrides
            .root
            .clone()
            .or_else(|| self.build.root.clone())
            .unwrap_or_else(|| defaults::ROOT_TEMPLATE.to_string());
        let root_template = if Path::new(&root).is_absolute() {
            root
        } else {
            project_dir.join(root).display().to_string()
        };

        let dirs = match &self.cache.dir {
            Some(dir) => PkgforgeDirs::with_cache_dir(project_dir.join(dir)),
            None => PkgforgeDirs::new(),
        };

        let repositories = self
            .repositories
            .iter()
            .cloned()
            .map(|mut repo| {
                repo.path = repo.path.map(|p| project_dir.join(p));
                repo
            })
            .collect();

        Ok(Settings {
            project_dir: project_dir.to_path_buf(),
            arch: overrides
                .arch
                .clone()
                .or_else(|| self.build.arch.clone())
                .unwrap_or_else(|| std::env::consts::ARCH.to_string()),
            builders,
            root_template,
            packages_dir: project_dir.join(
                self.build
                    .packages_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(defaults::PACKAGES_DIR)),
            ),
            state_dir: project_dir.join(
                self.build
                    .state_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(defaults::STATE_DIR)),
            ),
            max_cycle_passes,
            jobs: self.build.jobs.unwrap_or_else(num_cpus::get).max(1),
            container,
            dirs,
            repositories,
        })
    }
}
