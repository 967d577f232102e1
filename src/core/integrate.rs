//! Artifact integration and build history
//!
//! After a job finishes, its artifacts replace the package's directory in
//! the local repository and the aggregated index is rewritten. Every job,
//! successful or not, gets a history record and its log is kept.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::defaults;
use crate::core::builder::JobResult;
use crate::core::package::Package;
use crate::core::repository::{BinaryMeta, RepositoryPool};
use crate::core::status::PackageStatus;
use crate::error::{PkgforgeError, StoreError};
use crate::infra::filesystem;

/// One line of a package's build history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Package id
    pub package: String,
    /// Builder that ran the job
    pub builder: String,
    /// Target architecture
    pub arch: String,
    /// Why the package was built
    pub reason: String,
    /// Start time (unix seconds)
    pub start: u64,
    /// End time (unix seconds)
    pub end: u64,
    /// Duration in seconds
    pub duration: f64,
    /// `succeeded` or `failed`
    pub status: PackageStatus,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Append-only per-package history logs
#[derive(Debug, Clone)]
pub struct History {
    dir: PathBuf,
}

impl History {
    /// History inside the state directory
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join(defaults::HISTORY_DIR),
        }
    }

    /// History file of `package`
    pub fn path(&self, package: &str) -> PathBuf {
        self.dir.join(format!("{package}.jsonl"))
    }

    /// Append one record
    pub fn append(&self, record: &HistoryRecord) -> Result<(), StoreError> {
        let path = self.path(&record.package);
        let line = serde_json::to_string(record).map_err(|e| StoreError::Serialize {
            path: path.clone(),
            error: e.to_string(),
        })?;
        filesystem::append_line(&path, &line).map_err(|e| StoreError::Persist {
            path,
            error: e.to_string(),
        })
    }

    /// All records of `package`, oldest first
    ///
    /// Lines that do not parse are skipped; a missing file is an empty
    /// history.
    pub fn read(&self, package: &str) -> Result<Vec<HistoryRecord>, StoreError> {
        let path = self.path(package);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = filesystem::read_file(&path).map_err(|e| StoreError::Load {
            path: path.clone(),
            error: e.to_string(),
        })?;
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::debug!("Skipping history line in {}: {}", path.display(), e);
                    None
                }
            })
            .collect())
    }
}

/// Convert a shell glob to an anchored regex
///
/// `**` matches across directories, `*` and `?` do not.
pub fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                re.push_str(".*");
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Artifacts selected by `outputs` (all when empty), relative to `result_dir`
fn select_artifacts(result_dir: &Path, artifacts: &[PathBuf], outputs: &[String]) -> Vec<PathBuf> {
    let patterns: Vec<(bool, Regex)> = outputs
        .iter()
        .filter_map(|p| glob_to_regex(p).map(|re| (p.contains('/'), re)))
        .collect();

    artifacts
        .iter()
        .filter_map(|path| path.strip_prefix(result_dir).ok())
        .filter(|rel| {
            if patterns.is_empty() {
                return true;
            }
            let full = rel.to_string_lossy();
            let name = rel
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default();
            patterns
                .iter()
                .any(|(nested, re)| re.is_match(if *nested { &*full } else { &*name }))
        })
        .map(Path::to_path_buf)
        .collect()
}

/// Moves job results into the local repository
#[derive(Debug, Clone)]
pub struct Integrator {
    state_dir: PathBuf,
    arch: String,
    history: History,
}

impl Integrator {
    /// Integrator for the state directory
    pub fn new(state_dir: &Path, arch: &str) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            arch: arch.to_string(),
            history: History::new(state_dir),
        }
    }

    /// Directory holding the integrated artifacts of `package`
    pub fn package_dir(&self, package: &str) -> PathBuf {
        self.state_dir.join(defaults::REPO_DIR).join(package)
    }

    /// Record a finished job and, if it succeeded, publish its artifacts
    ///
    /// Returns whether the local repository changed. When publishing fails
    /// the package is removed from the local repository, the job is recorded
    /// as failed and the error is returned; the repository has changed in
    /// that case too.
    pub fn integrate(
        &self,
        result: &JobResult,
        package: &Package,
        builder: &str,
        pool: &mut RepositoryPool,
    ) -> Result<bool, PkgforgeError> {
        let published = if result.status == PackageStatus::Succeeded {
            self.publish(result, package, pool).map(|()| true).map_err(|e| {
                self.roll_back(&package.id, pool);
                e
            })
        } else {
            Ok(false)
        };

        if let Some(log) = &result.log {
            if log.exists() {
                let target = self
                    .state_dir
                    .join(defaults::LOGS_DIR)
                    .join(format!("{}.log", package.id));
                if let Err(e) = filesystem::move_file(log, &target) {
                    tracing::warn!("Cannot keep build log of {}: {}", package.id, e);
                }
            }
        }

        let (status, detail) = match &published {
            Ok(_) => (result.status, result.detail.clone()),
            Err(e) => (PackageStatus::Failed, Some(format!("integration failed: {e}"))),
        };
        let record = HistoryRecord {
            package: package.id.clone(),
            builder: builder.to_string(),
            arch: self.arch.clone(),
            reason: result.job.reason.to_string(),
            start: unix_secs(result.job.started),
            end: unix_secs(result.ended),
            duration: result.duration_secs(),
            status,
            detail,
        };
        if let Err(e) = self.history.append(&record) {
            tracing::warn!("Cannot record build history of {}: {}", package.id, e);
        }

        published
    }

    /// Drop a partially published package from the local repository
    fn roll_back(&self, package: &str, pool: &mut RepositoryPool) {
        let target = self.package_dir(package);
        if target.exists() {
            if let Err(e) = filesystem::remove_dir_all(&target) {
                tracing::warn!("Cannot remove {}: {}", target.display(), e);
            }
        }
        let local = pool.local_mut();
        local.replace_package(package, Vec::new());
        if let Err(e) = local.save_index() {
            tracing::warn!("Cannot rewrite local repository index: {}", e);
        }
    }

    fn publish(
        &self,
        result: &JobResult,
        package: &Package,
        pool: &mut RepositoryPool,
    ) -> Result<(), PkgforgeError> {
        let target = self.package_dir(&package.id);
        if target.exists() {
            filesystem::remove_dir_all(&target)?;
        }
        filesystem::create_dir_all(&target)?;

        let mut files = Vec::new();
        if let Some(result_dir) = &result.result_dir {
            let outputs = package
                .recipe
                .as_ref()
                .map(|r| r.build.outputs.as_slice())
                .unwrap_or_default();
            let selected = select_artifacts(result_dir, &result.artifacts, outputs);
            if selected.is_empty() && !result.artifacts.is_empty() {
                tracing::warn!("No artifact of {} matches its outputs", package.id);
            }
            for rel in selected {
                let dest = target.join(&rel);
                filesystem::move_file(&result_dir.join(&rel), &dest)?;
                files.push(dest);
            }
        }

        let checksum = filesystem::hash_tree(&target)?;
        let version = package.version().unwrap_or_default().to_string();
        let names = package
            .recipe
            .as_ref()
            .map(|r| r.provided_names(&package.id))
            .unwrap_or_else(|| vec![package.id.clone()]);
        let metas = names
            .into_iter()
            .map(|name| BinaryMeta {
                name,
                version: version.clone(),
                package: package.id.clone(),
                files: files.clone(),
                checksum: checksum.clone(),
            })
            .collect();

        let local = pool.local_mut();
        local.replace_package(&package.id, metas);
        local.save_index()?;

        tracing::info!(
            "Integrated {} artifacts of {} into {}",
            files.len(),
            package.id,
            target.display()
        );
        Ok(())
    }
}
