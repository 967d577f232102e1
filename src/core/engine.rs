//! Build engine
//!
//! Owns all run state and drives the control loop: evaluate every package,
//! start the assigned jobs, persist state, then suspend until a job
//! terminates and integrate its result. The loop ends when a pass starts no
//! job and none is running.

use std::future::Future;
use std::sync::Arc;

use crate::core::builder::{BuildExecutor, BuilderPool, FinishedJob, JobManager};
use crate::core::check::{check, CheckInput, CheckOutcome};
use crate::core::config::Settings;
use crate::core::cycle::CycleTracker;
use crate::core::integrate::Integrator;
use crate::core::oracle::{DependencyOracle, RequirementOracle};
use crate::core::package::{PackageRegistry, RecipeParser, TomlRecipeParser};
use crate::core::repository::{RepoKind, Repository, RepositoryPool};
use crate::core::resolver::DependencyGraph;
use crate::core::status::{PackageStatus, StatusEntry};
use crate::core::store::{Lastcheck, LastcheckStore, ResultStore, StatusMap};
use crate::error::PkgforgeError;
use crate::registry::{RepositoryClient, SnapshotCache};

/// Progress notifications emitted while running
#[derive(Debug)]
pub enum EngineEvent<'a> {
    /// A pass was evaluated and persisted
    Pass {
        /// Pass number, starting at 1
        number: usize,
        /// Result of the pass
        outcome: &'a CheckOutcome,
    },
    /// A job was started
    JobStarted {
        /// Package being built
        package: &'a str,
        /// Builder name
        builder: &'a str,
    },
    /// A job was integrated
    JobFinished {
        /// Package that was built
        package: &'a str,
        /// Terminal status
        status: PackageStatus,
    },
}

/// Callback receiving [`EngineEvent`]s
pub type Observer = Box<dyn Fn(&EngineEvent<'_>) + Send + Sync>;

/// Final state of a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Passes evaluated
    pub passes: usize,
    /// Jobs started
    pub jobs: usize,
    /// Status of every package after the last pass
    pub statuses: StatusMap,
}

impl RunSummary {
    /// Number of packages with `status`
    pub fn count(&self, status: PackageStatus) -> usize {
        self.statuses.values().filter(|e| e.status == status).count()
    }
}

/// Engine state for one run
pub struct Engine {
    arch: String,
    dry_run: bool,
    parser: Box<dyn RecipeParser>,
    oracle: Box<dyn DependencyOracle>,
    registry: PackageRegistry,
    pool: RepositoryPool,
    graph: DependencyGraph,
    order: Vec<String>,
    graph_dirty: bool,
    lastcheck: Lastcheck,
    finished: StatusMap,
    cycles: CycleTracker,
    jobs: JobManager,
    results: ResultStore,
    lastcheck_store: LastcheckStore,
    integrator: Integrator,
    observer: Option<Observer>,
    passes: usize,
    started: usize,
}

impl Engine {
    /// Create an engine over an already loaded registry and pool
    pub fn new(
        settings: &Settings,
        registry: PackageRegistry,
        pool: RepositoryPool,
        executor: Arc<dyn BuildExecutor>,
    ) -> Self {
        let builders = BuilderPool::new(&settings.root_template, settings.builders);
        let lastcheck_store = LastcheckStore::new(&settings.state_dir);
        let lastcheck = lastcheck_store.load();

        Self {
            arch: settings.arch.clone(),
            dry_run: false,
            parser: Box::new(TomlRecipeParser),
            oracle: Box::new(RequirementOracle),
            registry,
            pool,
            graph: DependencyGraph::new(),
            order: Vec::new(),
            graph_dirty: true,
            lastcheck,
            finished: StatusMap::new(),
            cycles: CycleTracker::new(settings.max_cycle_passes),
            jobs: JobManager::new(executor, builders),
            results: ResultStore::new(&settings.state_dir),
            lastcheck_store,
            integrator: Integrator::new(&settings.state_dir, &settings.arch),
            observer: None,
            passes: 0,
            started: 0,
        }
    }

    /// Discover packages, load the local repository and fetch remote sources
    pub async fn open(
        settings: &Settings,
        executor: Arc<dyn BuildExecutor>,
    ) -> Result<Self, PkgforgeError> {
        let parser = TomlRecipeParser;
        let registry = PackageRegistry::discover(&settings.packages_dir, &parser, &settings.arch)?;

        let repo_dir = settings.repo_dir();
        let local = Repository::load_local(&repo_dir).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable local repository index: {}", e);
            Repository::new("local", repo_dir.clone(), RepoKind::Local)
        });
        let mut pool = RepositoryPool::new(local);

        if !settings.repositories.is_empty() {
            let cache = SnapshotCache::new(settings.dirs.snapshots_dir());
            let remotes = RepositoryClient::new()
                .load_all(&settings.repositories, &cache)
                .await;
            for repo in remotes {
                pool.push(repo);
            }
        }

        Ok(Self::new(settings, registry, pool, executor))
    }

    /// Evaluate only: never start jobs or write state
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Replace the recipe parser used to re-read broken packages
    #[must_use]
    pub fn with_parser(mut self, parser: Box<dyn RecipeParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Replace the dependency oracle
    #[must_use]
    pub fn with_oracle(mut self, oracle: Box<dyn DependencyOracle>) -> Self {
        self.oracle = oracle;
        self.graph_dirty = true;
        self
    }

    /// Receive progress events
    #[must_use]
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The package registry
    pub fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    /// The repository pool
    pub fn pool(&self) -> &RepositoryPool {
        &self.pool
    }

    /// Whether jobs are running
    pub fn has_active_jobs(&self) -> bool {
        self.jobs.has_active()
    }

    /// Run until no work remains, aborting on Ctrl-C
    pub async fn run(&mut self) -> Result<RunSummary, PkgforgeError> {
        self.run_until(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until no work remains or `shutdown` resolves
    ///
    /// On shutdown every running job is killed and state is persisted
    /// before [`PkgforgeError::Interrupted`] is returned.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<RunSummary, PkgforgeError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let outcome = self.pass()?;
            if self.dry_run || !self.jobs.has_active() {
                return Ok(RunSummary {
                    passes: self.passes,
                    jobs: self.started,
                    statuses: outcome.statuses,
                });
            }

            let finished = tokio::select! {
                finished = self.jobs.wait_for_any() => Some(finished),
                () = &mut shutdown => None,
            };

            match finished {
                Some(Some(job)) => self.complete(job),
                Some(None) => {
                    tracing::warn!("Lost track of running jobs, releasing all builders");
                    self.jobs.abort_all().await;
                }
                None => {
                    tracing::warn!("Interrupted, stopping running builds");
                    self.jobs.abort_all().await;
                    let mut statuses = outcome.statuses;
                    for entry in statuses.values_mut() {
                        if entry.status == PackageStatus::Building {
                            *entry =
                                StatusEntry::with_details(PackageStatus::Blocked, "interrupted");
                        }
                    }
                    self.persist(&statuses)?;
                    return Err(PkgforgeError::Interrupted);
                }
            }
        }
    }

    /// Evaluate every package once, start assigned jobs and persist state
    pub fn pass(&mut self) -> Result<CheckOutcome, PkgforgeError> {
        self.passes += 1;

        let reloaded = self.registry.refresh_broken(self.parser.as_ref(), &self.arch);
        if !reloaded.is_empty() || self.graph_dirty {
            self.rebuild_graph();
        }

        let building = self.jobs.building();
        let idle = self.jobs.idle_builders();
        let labels = self.jobs.builders().labels();
        let input = CheckInput {
            registry: &self.registry,
            graph: &self.graph,
            order: &self.order,
            pool: &self.pool,
            lastcheck: &self.lastcheck,
            finished: &self.finished,
            building: &building,
            idle_builders: &idle,
            builder_labels: &labels,
            dry_run: self.dry_run,
        };
        let mut outcome = check(&input, &mut self.cycles);

        for assignment in &outcome.assignments {
            let Some(package) = self.registry.get(&assignment.package) else {
                continue;
            };
            match self.jobs.assign(assignment, package, &self.arch) {
                Ok(()) => {
                    self.started += 1;
                    if let Some(observer) = &self.observer {
                        let builder = labels
                            .get(assignment.builder)
                            .map_or("", String::as_str);
                        observer(&EngineEvent::JobStarted {
                            package: &assignment.package,
                            builder,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!("Cannot start build of {}: {}", assignment.package, e);
                    let entry = StatusEntry::with_details(PackageStatus::Failed, e.to_string());
                    self.finished
                        .insert(assignment.package.clone(), entry.clone());
                    outcome.statuses.insert(assignment.package.clone(), entry);
                }
            }
        }

        let registry = &self.registry;
        self.lastcheck.retain(|id, _| registry.get(id).is_some());
        if !self.dry_run {
            self.persist(&outcome.statuses)?;
        }

        tracing::info!(
            "Pass {}: {} building, {} blocked, {} succeeded, {} failed",
            self.passes,
            outcome.count(PackageStatus::Building),
            outcome.count(PackageStatus::Blocked),
            outcome.count(PackageStatus::Succeeded),
            outcome.count(PackageStatus::Failed)
        );
        if let Some(observer) = &self.observer {
            observer(&EngineEvent::Pass {
                number: self.passes,
                outcome: &outcome,
            });
        }
        Ok(outcome)
    }

    /// Wait for one running job and integrate it
    ///
    /// Returns `false` when no job was running.
    pub async fn collect(&mut self) -> bool {
        match self.jobs.wait_for_any().await {
            Some(job) => {
                self.complete(job);
                true
            }
            None => false,
        }
    }

    fn rebuild_graph(&mut self) {
        self.graph = DependencyGraph::build(&self.registry, &self.pool, self.oracle.as_ref());
        self.order = self.graph.sort();
        self.graph_dirty = false;
        tracing::debug!(
            "Rebuilt dependency graph: {} packages, {} cycles",
            self.order.len(),
            self.graph.cycles().len()
        );
    }

    fn complete(&mut self, finished: FinishedJob) {
        let Some(result) = self.jobs.finish(finished) else {
            return;
        };
        let id = result.job.package.clone();
        let builder = self
            .jobs
            .builders()
            .get(result.job.builder)
            .map(|b| b.name.clone())
            .unwrap_or_default();

        let mut status = result.status;
        let mut detail = result.detail.clone();
        if let Some(package) = self.registry.get(&id) {
            match self
                .integrator
                .integrate(&result, package, &builder, &mut self.pool)
            {
                Ok(changed) => self.graph_dirty |= changed,
                Err(e) => {
                    tracing::warn!("Integration of {} failed: {}", id, e);
                    self.graph_dirty = true;
                    status = PackageStatus::Failed;
                    detail = Some(format!("integration failed: {e}"));
                }
            }
        }

        if status == PackageStatus::Succeeded {
            self.lastcheck.insert(id.clone(), result.job.fingerprint.clone());
        } else {
            self.lastcheck.remove(&id);
        }

        let entry = match detail {
            Some(detail) => StatusEntry::with_details(status, detail),
            None => StatusEntry::new(status),
        };
        self.finished.insert(id.clone(), entry);

        if let Some(observer) = &self.observer {
            observer(&EngineEvent::JobFinished {
                package: &id,
                status,
            });
        }
    }

    fn persist(&self, statuses: &StatusMap) -> Result<(), PkgforgeError> {
        self.results.save(statuses)?;
        self.lastcheck_store.save(&self.lastcheck)?;
        Ok(())
    }
}
