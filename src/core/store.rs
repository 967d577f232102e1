//! Result Store and Lastcheck cache
//!
//! Both files are JSON maps keyed by package id, rewritten wholesale after
//! every pass. They are read by external reporting processes while the engine
//! runs, so they are only ever replaced atomically.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::status::StatusEntry;
use crate::error::StoreError;
use crate::infra::filesystem;

/// Package id -> current status
pub type StatusMap = BTreeMap<String, StatusEntry>;

/// Package id -> fingerprint of the last successful build
pub type Lastcheck = BTreeMap<String, String>;

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialize {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    filesystem::write_file_atomic(path, &json).map_err(|e| StoreError::Persist {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = filesystem::read_file(path).map_err(|e| StoreError::Load {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| StoreError::Load {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// The `_result` file
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    /// Store inside the state directory
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(defaults::RESULT_FILE),
        }
    }

    /// Path of the results file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the last written status map (empty when never written)
    pub fn load(&self) -> Result<StatusMap, StoreError> {
        load_json(&self.path)
    }

    /// Replace the results file
    pub fn save(&self, statuses: &StatusMap) -> Result<(), StoreError> {
        save_json(&self.path, statuses)
    }
}

/// The `_lastcheck` file
#[derive(Debug, Clone)]
pub struct LastcheckStore {
    path: PathBuf,
}

impl LastcheckStore {
    /// Store inside the state directory
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(defaults::LASTCHECK_FILE),
        }
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cache, discarding implausibly short fingerprints
    ///
    /// An unreadable cache only costs recomputation, so it is treated as
    /// empty.
    pub fn load(&self) -> Lastcheck {
        let mut lastcheck: Lastcheck = match load_json(&self.path) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("Ignoring lastcheck cache: {}", e);
                return Lastcheck::new();
            }
        };

        let before = lastcheck.len();
        lastcheck.retain(|_, fingerprint| fingerprint.len() > defaults::MIN_FINGERPRINT_LEN);
        if lastcheck.len() != before {
            tracing::warn!(
                "Discarded {} corrupt lastcheck entries",
                before - lastcheck.len()
            );
        }
        lastcheck
    }

    /// Replace the cache file
    pub fn save(&self, lastcheck: &Lastcheck) -> Result<(), StoreError> {
        save_json(&self.path, lastcheck)
    }

    /// Remove the cache file
    pub fn clear(&self) -> Result<bool, StoreError> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path).map_err(|e| StoreError::Persist {
            path: self.path.clone(),
            error: e.to_string(),
        })?;
        Ok(true)
    }
}
