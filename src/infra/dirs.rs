//! Platform-specific directory management
//!
//! Provides the cache directory used for remote repository snapshots.
//! Follows the XDG Base Directory Specification on Linux and standard
//! locations on macOS.
//!
//! The `PKGFORGE_CACHE_DIR` environment variable overrides the default.

use std::env;
use std::path::PathBuf;

/// Environment variable overriding the cache directory
pub const ENV_CACHE_DIR: &str = "PKGFORGE_CACHE_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "pkgforge";

/// Subdirectory holding repository snapshots
const SNAPSHOTS_SUBDIR: &str = "snapshots";

/// Platform-specific directory provider for pkgforge
#[derive(Debug, Clone)]
pub struct PkgforgeDirs {
    cache_dir: PathBuf,
}

impl PkgforgeDirs {
    /// Create a new `PkgforgeDirs` instance
    ///
    /// Checks the environment first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: Self::resolve_cache_dir(),
        }
    }

    /// Use an explicit cache directory
    #[must_use]
    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Get the cache directory path
    ///
    /// - Linux: `$XDG_CACHE_HOME/pkgforge` or `~/.cache/pkgforge`
    /// - macOS: `~/Library/Caches/pkgforge`
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    /// Directory of remote repository snapshots
    #[must_use]
    pub fn snapshots_dir(&self) -> PathBuf {
        self.cache_dir.join(SNAPSHOTS_SUBDIR)
    }

    fn resolve_cache_dir() -> PathBuf {
        if let Ok(path) = env::var(ENV_CACHE_DIR) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        dirs::cache_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| {
                // Fallback to home directory
                dirs::home_dir()
                    .map(|h| h.join(".cache").join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from(".").join(".cache").join(APP_NAME))
            })
    }
}

impl Default for PkgforgeDirs {
    fn default() -> Self {
        Self::new()
    }
}
