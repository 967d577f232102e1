//! Snapshot cache for remote repositories
//!
//! The last successfully fetched index of every remote source is kept so a
//! failed fetch can fall back to it.

use std::path::{Path, PathBuf};

use crate::core::repository::RepositoryIndex;
use crate::error::StoreError;
use crate::infra::filesystem;

/// Local cache of remote repository indexes
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    /// Cache directory path
    dir: PathBuf,
}

impl SnapshotCache {
    /// Create a new snapshot cache
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Get the cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot file of source `name`
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Cached index of `name`, if one exists and parses
    pub fn load(&self, name: &str) -> Option<RepositoryIndex> {
        let path = self.path(name);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::warn!("Ignoring corrupt snapshot {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Replace the snapshot of `name`
    pub fn store(&self, name: &str, index: &RepositoryIndex) -> Result<(), StoreError> {
        let path = self.path(name);
        let json = serde_json::to_vec_pretty(index).map_err(|e| StoreError::Serialize {
            path: path.clone(),
            error: e.to_string(),
        })?;
        filesystem::write_file_atomic(&path, &json).map_err(|e| StoreError::Persist {
            path,
            error: e.to_string(),
        })
    }
}
