//! Builder pool and job management
//!
//! A fixed set of builder slots, each owning an isolated build root. Jobs run
//! through a [`BuildExecutor`] on the tokio runtime; the engine waits for the
//! first one to finish and collects its result from the builder root.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::task::JoinSet;

use crate::config::defaults;
use crate::core::check::{Assignment, BuildReason};
use crate::core::oracle::ResolvedDep;
use crate::core::package::Package;
use crate::core::status::PackageStatus;
use crate::error::BuildError;
use crate::infra::filesystem;

/// One build slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Builder {
    /// Slot index, starting at 0
    pub index: usize,
    /// Display name
    pub name: String,
    /// Build root owned by this slot
    pub root: PathBuf,
}

/// Fixed set of builder slots
#[derive(Debug, Clone)]
pub struct BuilderPool {
    builders: Vec<Builder>,
}

impl BuilderPool {
    /// Create `count` builders from a root template
    ///
    /// With one builder the template is used as is (minus any `{n}`). With
    /// more, `{n}` is replaced by the 1-based slot number, or `_<n>` is
    /// appended when the template has no placeholder. `count` is clamped to
    /// `1..=MAX_BUILDERS`.
    pub fn new(template: &str, count: usize) -> Self {
        let count = count.clamp(1, defaults::MAX_BUILDERS);
        let builders = (0..count)
            .map(|index| Builder {
                index,
                name: format!("builder{}", index + 1),
                root: PathBuf::from(expand_root(template, index, count)),
            })
            .collect();
        Self { builders }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.builders.len()
    }

    /// Always false; a pool has at least one slot
    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Slot by index
    pub fn get(&self, index: usize) -> Option<&Builder> {
        self.builders.get(index)
    }

    /// All slots
    pub fn iter(&self) -> impl Iterator<Item = &Builder> {
        self.builders.iter()
    }

    /// Display names in slot order
    pub fn labels(&self) -> Vec<String> {
        self.builders.iter().map(|b| b.name.clone()).collect()
    }
}

fn expand_root(template: &str, index: usize, count: usize) -> String {
    if count == 1 {
        return template.replace(defaults::ROOT_PLACEHOLDER, "");
    }
    let n = (index + 1).to_string();
    if template.contains(defaults::ROOT_PLACEHOLDER) {
        template.replace(defaults::ROOT_PLACEHOLDER, &n)
    } else {
        format!("{template}_{n}")
    }
}

/// Everything an executor needs to build one package
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Package id
    pub package: String,
    /// Package directory
    pub dir: PathBuf,
    /// Build script, relative to `dir`
    pub script: String,
    /// Target architecture
    pub arch: String,
    /// Builder root, exclusively owned by this job
    pub root: PathBuf,
    /// Resolved dependencies
    pub deps: Vec<ResolvedDep>,
}

impl BuildRequest {
    /// Directory the build writes its artifacts to
    pub fn result_dir(&self) -> PathBuf {
        self.root.join(defaults::RESULT_SUBDIR)
    }

    /// Log file of the build
    pub fn log_path(&self) -> PathBuf {
        self.root.join(defaults::BUILD_LOG)
    }

    /// Artifact files of all dependency binaries
    pub fn dependency_files(&self) -> Vec<PathBuf> {
        self.deps
            .iter()
            .filter_map(|d| d.binary.as_ref())
            .flat_map(|b| b.meta.files.iter().cloned())
            .collect()
    }
}

/// What an executor reports once the build terminated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Process exit code (`None` when killed by a signal)
    pub exit_code: Option<i32>,
    /// Directory holding the produced artifacts
    pub result_dir: PathBuf,
    /// Captured build log
    pub log: Option<PathBuf>,
}

/// Runs one build, outside this process
pub trait BuildExecutor: Send + Sync {
    /// Start the build; the future resolves when it terminated
    fn execute(&self, request: BuildRequest) -> BoxFuture<'static, Result<ExecOutcome, BuildError>>;
}

/// An active job
#[derive(Debug, Clone)]
pub struct Job {
    /// Package being built
    pub package: String,
    /// Builder slot
    pub builder: usize,
    /// Fingerprint recorded on success
    pub fingerprint: String,
    /// Why it is built
    pub reason: BuildReason,
    /// Start time
    pub started: SystemTime,
}

/// A job whose executor future resolved
#[derive(Debug)]
pub struct FinishedJob {
    builder: usize,
    outcome: Result<ExecOutcome, BuildError>,
}

/// Collected result of a job
#[derive(Debug, Clone)]
pub struct JobResult {
    /// The job
    pub job: Job,
    /// End time
    pub ended: SystemTime,
    /// `Succeeded` or `Failed`
    pub status: PackageStatus,
    /// Failure reason
    pub detail: Option<String>,
    /// Artifact directory
    pub result_dir: Option<PathBuf>,
    /// Artifact files, failure marker excluded
    pub artifacts: Vec<PathBuf>,
    /// Build log
    pub log: Option<PathBuf>,
}

impl JobResult {
    /// Seconds between start and end
    pub fn duration_secs(&self) -> f64 {
        self.ended
            .duration_since(self.job.started)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }
}

/// Starts, tracks and collects jobs
pub struct JobManager {
    executor: Arc<dyn BuildExecutor>,
    builders: BuilderPool,
    active: HashMap<usize, Job>,
    tasks: JoinSet<(usize, Result<ExecOutcome, BuildError>)>,
}

impl JobManager {
    /// Create a manager over `builders`
    pub fn new(executor: Arc<dyn BuildExecutor>, builders: BuilderPool) -> Self {
        Self {
            executor,
            builders,
            active: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    /// The builder pool
    pub fn builders(&self) -> &BuilderPool {
        &self.builders
    }

    /// Package -> builder slot of every active job
    pub fn building(&self) -> BTreeMap<String, usize> {
        self.active
            .values()
            .map(|job| (job.package.clone(), job.builder))
            .collect()
    }

    /// Free slots in index order
    pub fn idle_builders(&self) -> Vec<usize> {
        self.builders
            .iter()
            .map(|b| b.index)
            .filter(|i| !self.active.contains_key(i))
            .collect()
    }

    /// Whether any job is running
    pub fn has_active(&self) -> bool {
        !self.active.is_empty()
    }

    /// Start a job for `package` on the assigned builder
    pub fn assign(
        &mut self,
        assignment: &Assignment,
        package: &Package,
        arch: &str,
    ) -> Result<(), BuildError> {
        let builder = self
            .builders
            .get(assignment.builder)
            .ok_or(BuildError::NoSuchBuilder {
                builder: assignment.builder,
            })?;
        if let Some(job) = self.active.get(&builder.index) {
            return Err(BuildError::BuilderBusy {
                builder: builder.index,
                package: job.package.clone(),
            });
        }

        let script = package
            .recipe
            .as_ref()
            .map_or(defaults::BUILD_SCRIPT, |r| r.script())
            .to_string();
        let request = BuildRequest {
            package: package.id.clone(),
            dir: package.dir.clone(),
            script,
            arch: arch.to_string(),
            root: builder.root.clone(),
            deps: assignment.deps.clone(),
        };

        tracing::info!(
            "Starting build of {} on {} ({})",
            package.id,
            builder.name,
            assignment.reason
        );

        let index = builder.index;
        let package_id = package.id.clone();
        let future = self.executor.execute(request);
        self.tasks.spawn(async move {
            let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => Err(BuildError::SpawnFailed {
                    package: package_id,
                    error: "build executor panicked".to_string(),
                }),
            };
            (index, outcome)
        });

        self.active.insert(
            index,
            Job {
                package: package.id.clone(),
                builder: index,
                fingerprint: assignment.fingerprint.clone(),
                reason: assignment.reason,
                started: SystemTime::now(),
            },
        );
        Ok(())
    }

    /// Wait until at least one job terminated
    ///
    /// Returns `None` when no job is active.
    pub async fn wait_for_any(&mut self) -> Option<FinishedJob> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((builder, outcome)) => return Some(FinishedJob { builder, outcome }),
                Err(e) if e.is_cancelled() => continue,
                Err(e) => tracing::error!("Build task failed: {}", e),
            }
        }
        None
    }

    /// Release the builder and collect the job's result
    ///
    /// A non-zero exit or a failure marker in the result directory makes the
    /// job `failed`; the marker's content, if any, is the reason.
    pub fn finish(&mut self, finished: FinishedJob) -> Option<JobResult> {
        let job = self.active.remove(&finished.builder)?;
        let ended = SystemTime::now();

        let outcome = match finished.outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Build of {} could not run: {}", job.package, e);
                return Some(JobResult {
                    job,
                    ended,
                    status: PackageStatus::Failed,
                    detail: Some(e.to_string()),
                    result_dir: None,
                    artifacts: Vec::new(),
                    log: None,
                });
            }
        };

        let marker = outcome.result_dir.join(defaults::FAILED_MARKER);
        let (status, detail) = if marker.exists() {
            let reason = std::fs::read_to_string(&marker)
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            let reason = if reason.is_empty() {
                "failure marker present".to_string()
            } else {
                reason
            };
            (PackageStatus::Failed, Some(reason))
        } else {
            match outcome.exit_code {
                Some(0) => (PackageStatus::Succeeded, None),
                Some(code) => (PackageStatus::Failed, Some(format!("exit status {code}"))),
                None => (
                    PackageStatus::Failed,
                    Some("terminated by signal".to_string()),
                ),
            }
        };

        let artifacts = if status == PackageStatus::Succeeded {
            collect_artifacts(&outcome.result_dir)
        } else {
            Vec::new()
        };

        tracing::info!("Build of {} finished: {}", job.package, status);
        Some(JobResult {
            job,
            ended,
            status,
            detail,
            result_dir: Some(outcome.result_dir),
            artifacts,
            log: outcome.log,
        })
    }

    /// Kill every running job
    pub async fn abort_all(&mut self) {
        if self.active.is_empty() {
            return;
        }
        tracing::warn!("Aborting {} running builds", self.active.len());
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        self.active.clear();
    }
}

fn collect_artifacts(result_dir: &Path) -> Vec<PathBuf> {
    match filesystem::list_files(result_dir) {
        Ok(files) => files
            .into_iter()
            .filter(|f| f.file_name().is_some_and(|n| n != defaults::FAILED_MARKER))
            .collect(),
        Err(e) => {
            tracing::warn!("Cannot list artifacts in {}: {}", result_dir.display(), e);
            Vec::new()
        }
    }
}
