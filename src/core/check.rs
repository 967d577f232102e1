//! Status evaluation
//!
//! One pass over all packages in build order. The evaluator is pure: it reads
//! the in-memory registry, graph, pool and job bookkeeping and returns the
//! status of every package plus the jobs that should be started. Only the
//! cycle retry state is carried between passes.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;

use crate::core::cycle::{CyclePhase, CycleTracker};
use crate::core::oracle::ResolvedDep;
use crate::core::package::{Package, PackageError, PackageRegistry};
use crate::core::repository::RepositoryPool;
use crate::core::resolver::{Cycle, DependencyGraph};
use crate::core::status::{PackageStatus, StatusEntry};

/// Why a package is being built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildReason {
    /// No previous successful build is recorded
    NewBuild,
    /// Source files changed
    SourceChange,
    /// A dependency binary changed
    MetaChange,
    /// Unchanged, but the local repository lacks the binaries
    MissingBinaries,
}

impl BuildReason {
    fn classify(previous: Option<&String>, fingerprint: &str, source_len: usize) -> Self {
        match previous {
            None => Self::NewBuild,
            Some(old) if old == fingerprint => Self::MissingBinaries,
            Some(old) if old.get(..source_len) != fingerprint.get(..source_len) => {
                Self::SourceChange
            }
            Some(_) => Self::MetaChange,
        }
    }
}

impl fmt::Display for BuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NewBuild => "new build",
            Self::SourceChange => "source change",
            Self::MetaChange => "meta change",
            Self::MissingBinaries => "missing binaries",
        })
    }
}

/// A job the engine should start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Package to build
    pub package: String,
    /// Builder slot index
    pub builder: usize,
    /// Fingerprint to record on success
    pub fingerprint: String,
    /// Why the package is built
    pub reason: BuildReason,
    /// Resolved dependencies handed to the executor
    pub deps: Vec<ResolvedDep>,
}

/// Everything one pass reads
#[derive(Debug, Clone, Copy)]
pub struct CheckInput<'a> {
    /// All packages
    pub registry: &'a PackageRegistry,
    /// Current dependency graph
    pub graph: &'a DependencyGraph,
    /// Build order from [`DependencyGraph::sort`]
    pub order: &'a [String],
    /// Current repository pool
    pub pool: &'a RepositoryPool,
    /// Lastcheck cache
    pub lastcheck: &'a BTreeMap<String, String>,
    /// Terminal results of jobs finished in this run
    pub finished: &'a BTreeMap<String, StatusEntry>,
    /// Package -> builder slot of running jobs
    pub building: &'a BTreeMap<String, usize>,
    /// Idle builder slots, in assignment preference order
    pub idle_builders: &'a [usize],
    /// Display label per builder slot
    pub builder_labels: &'a [String],
    /// Decide only, never assign
    pub dry_run: bool,
}

/// Result of one pass
#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    /// Status of every package
    pub statuses: BTreeMap<String, StatusEntry>,
    /// Jobs to start
    pub assignments: Vec<Assignment>,
}

impl CheckOutcome {
    /// Number of packages with `status`
    pub fn count(&self, status: PackageStatus) -> usize {
        self.statuses.values().filter(|e| e.status == status).count()
    }
}

/// Fingerprint of a package: source hash followed by a hash over the
/// checksums of the dependency binaries it would be built against
pub fn fingerprint(source_hash: &str, deps: &[ResolvedDep]) -> String {
    let mut entries: Vec<String> = deps
        .iter()
        .map(|d| {
            let checksum = d.binary.as_ref().map_or("", |b| b.meta.checksum.as_str());
            format!("{}={}", d.name, checksum)
        })
        .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.as_bytes());
        hasher.update([0u8]);
    }
    format!("{source_hash}{}", hex::encode(hasher.finalize()))
}

/// Evaluate every package once
pub fn check(input: &CheckInput<'_>, cycles: &mut CycleTracker) -> CheckOutcome {
    let mut evaluator = Evaluator {
        input,
        outcome: CheckOutcome::default(),
        notready: HashSet::new(),
        idle: input.idle_builders.iter().copied().collect(),
    };

    for id in input.order {
        if evaluator.outcome.statuses.contains_key(id) {
            continue;
        }
        match input.graph.cycle_of(id) {
            Some(cycle) => evaluator.evaluate_cycle(cycle, cycles),
            None => evaluator.evaluate(id, None),
        }
    }

    // Packages missing from the order (never happens for a graph built from
    // the same registry) are still reported.
    for package in input.registry.iter() {
        if !evaluator.outcome.statuses.contains_key(&package.id) {
            evaluator.evaluate(&package.id, None);
        }
    }

    tracing::debug!(
        "Pass evaluated {} packages, {} assignments",
        evaluator.outcome.statuses.len(),
        evaluator.outcome.assignments.len()
    );
    evaluator.outcome
}

/// How a cycle member is evaluated in this pass
struct CycleScope<'c> {
    cycle: &'c Cycle,
    phase: CyclePhase,
}

struct Evaluator<'i, 'a> {
    input: &'i CheckInput<'a>,
    outcome: CheckOutcome,
    /// Build-time producers that will deliver new binaries in this run
    notready: HashSet<String>,
    idle: VecDeque<usize>,
}

impl Evaluator<'_, '_> {
    fn evaluate_cycle(&mut self, cycle: &Cycle, cycles: &mut CycleTracker) {
        let input = self.input;
        let settled = cycle
            .members
            .iter()
            .filter(|m| input.building.contains_key(*m) || input.finished.contains_key(*m))
            .count();
        // With every builder taken the cycle cannot be tried this pass, so
        // the pass does not count against its stall limit.
        let no_builder = !input.dry_run && self.idle.is_empty();
        let waiting = no_builder
            || cycle.members.iter().any(|m| {
                input.building.contains_key(m)
                    || input
                        .graph
                        .dependencies(m)
                        .any(|d| !cycle.contains(d) && self.notready.contains(d))
            });

        let phase = cycles.advance(cycle, settled, waiting);
        tracing::debug!("Cycle {} evaluated as {:?}", cycle.describe(), phase);

        let scope = CycleScope { cycle, phase };
        for member in &cycle.members {
            self.evaluate(member, Some(&scope));
        }
    }

    fn evaluate(&mut self, id: &str, scope: Option<&CycleScope<'_>>) {
        let input = self.input;
        let Some(package) = input.registry.get(id) else {
            return;
        };
        let entry = self.status_of(package, scope);
        if entry.status.is_pending() && package.use_for_build() {
            self.notready.insert(id.to_string());
        }
        self.outcome.statuses.insert(id.to_string(), entry);
    }

    fn status_of(&mut self, package: &Package, scope: Option<&CycleScope<'_>>) -> StatusEntry {
        let input = self.input;
        let id = package.id.as_str();

        match &package.error {
            Some(PackageError::Broken(msg)) => {
                return StatusEntry::with_details(PackageStatus::Broken, msg.clone());
            }
            Some(error) => {
                return StatusEntry {
                    status: error.status(),
                    details: error.details(),
                };
            }
            None => {}
        }

        if let Some(&builder) = input.building.get(id) {
            return self.building_entry(builder);
        }

        let deps = match input.graph.expansion(id) {
            Some(Ok(deps)) => deps,
            Some(Err(e)) => {
                return StatusEntry::with_details(PackageStatus::Unresolvable, e.to_string());
            }
            None => {
                return StatusEntry::with_details(
                    PackageStatus::Unresolvable,
                    "dependencies not evaluated",
                );
            }
        };

        if let Some(entry) = input.finished.get(id) {
            return entry.clone();
        }

        let fingerprint = fingerprint(&package.source_hash, deps);

        if let Some(reason) = self.blocked_reason(deps, scope) {
            return StatusEntry::with_details(PackageStatus::Blocked, reason);
        }

        let previous = input.lastcheck.get(id);
        if previous == Some(&fingerprint) && input.pool.local().has_package(id) {
            return StatusEntry::new(PackageStatus::Succeeded);
        }

        if let Some(reason) = missing_binary(deps) {
            return StatusEntry::with_details(PackageStatus::Blocked, reason);
        }

        if input.dry_run {
            return StatusEntry::new(PackageStatus::Scheduled);
        }

        let Some(builder) = self.idle.pop_front() else {
            return StatusEntry::with_details(PackageStatus::Blocked, "waiting for free builder");
        };

        let reason = BuildReason::classify(previous, &fingerprint, package.source_hash.len());
        tracing::info!("Assigning {} to {} ({})", id, self.label(builder), reason);
        self.outcome.assignments.push(Assignment {
            package: id.to_string(),
            builder,
            fingerprint,
            reason,
            deps: deps.clone(),
        });
        self.building_entry(builder)
    }

    /// Reasons that depend on other packages' progress in this run
    fn blocked_reason(&self, deps: &[ResolvedDep], scope: Option<&CycleScope<'_>>) -> Option<String> {
        if let Some(scope) = scope {
            if let CyclePhase::Stalled { idle_passes } = scope.phase {
                return Some(format!(
                    "cycle stalled after {idle_passes} passes: {}",
                    scope.cycle.describe()
                ));
            }
            let busy = scope.cycle.members.iter().find(|m| {
                self.input.building.contains_key(*m)
                    || self.outcome.assignments.iter().any(|a| &a.package == *m)
            });
            if let Some(member) = busy {
                return Some(format!("cycle member {member} building"));
            }
        }

        let mut waiting: Vec<&str> = deps
            .iter()
            .filter_map(|d| d.producer.as_deref())
            .filter(|p| self.notready.contains(*p))
            .filter(|p| !scope.is_some_and(|s| s.cycle.contains(p)))
            .collect();
        waiting.sort_unstable();
        waiting.dedup();

        (!waiting.is_empty()).then(|| format!("waiting for {}", waiting.join(", ")))
    }

    fn building_entry(&self, builder: usize) -> StatusEntry {
        if self.input.builder_labels.len() > 1 {
            StatusEntry::with_details(PackageStatus::Building, self.label(builder))
        } else {
            StatusEntry::new(PackageStatus::Building)
        }
    }

    fn label(&self, builder: usize) -> String {
        self.input
            .builder_labels
            .get(builder)
            .cloned()
            .unwrap_or_else(|| format!("builder {}", builder + 1))
    }
}

/// First dependency with no binary to build against
///
/// Within a cycle this is the only requirement on other members: any
/// existing binary of a member satisfies it, pending or not.
fn missing_binary(deps: &[ResolvedDep]) -> Option<String> {
    deps.iter()
        .find(|d| !d.is_available())
        .map(|d| format!("{}: no binary available", d.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::oracle::RequirementOracle;
    use crate::core::package::{Directive, Recipe};
    use crate::core::repository::{BinaryMeta, RepoKind, Repository};
    use std::path::PathBuf;

    const HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

    struct Fixture {
        registry: PackageRegistry,
        pool: RepositoryPool,
        lastcheck: BTreeMap<String, String>,
        finished: BTreeMap<String, StatusEntry>,
        building: BTreeMap<String, usize>,
        builders: usize,
        dry_run: bool,
        cycles: CycleTracker,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: PackageRegistry::new(),
                pool: RepositoryPool::new(Repository::new(
                    "local",
                    PathBuf::from("/repo"),
                    RepoKind::Local,
                )),
                lastcheck: BTreeMap::new(),
                finished: BTreeMap::new(),
                building: BTreeMap::new(),
                builders: 1,
                dry_run: false,
                cycles: CycleTracker::default(),
            }
        }

        fn package(&mut self, id: &str, depends: &[&str]) -> &mut Self {
            let depends = depends
                .iter()
                .map(|d| format!("\"{d}\""))
                .collect::<Vec<_>>()
                .join(", ");
            let recipe =
                Recipe::from_toml(&format!("[package]\nversion = \"1.0\"\ndepends = [{depends}]\n"))
                    .unwrap();
            self.registry.insert(Package::from_recipe(id, recipe, HASH));
            self
        }

        fn binary(&mut self, package: &str) -> &mut Self {
            let metas = vec![BinaryMeta {
                name: package.to_string(),
                version: "1.0".to_string(),
                package: package.to_string(),
                files: Vec::new(),
                checksum: format!("sum-{package}"),
            }];
            self.pool.local_mut().replace_package(package, metas);
            self
        }

        fn run(&mut self) -> CheckOutcome {
            let graph = DependencyGraph::build(&self.registry, &self.pool, &RequirementOracle);
            let order = graph.sort();
            let busy: HashSet<usize> = self.building.values().copied().collect();
            let idle: Vec<usize> = (0..self.builders).filter(|b| !busy.contains(b)).collect();
            let labels: Vec<String> = (0..self.builders).map(|b| format!("builder{}", b + 1)).collect();
            let input = CheckInput {
                registry: &self.registry,
                graph: &graph,
                order: &order,
                pool: &self.pool,
                lastcheck: &self.lastcheck,
                finished: &self.finished,
                building: &self.building,
                idle_builders: &idle,
                builder_labels: &labels,
                dry_run: self.dry_run,
            };
            check(&input, &mut self.cycles)
        }
    }

    fn status(outcome: &CheckOutcome, id: &str) -> PackageStatus {
        outcome.statuses[id].status
    }

    fn details<'o>(outcome: &'o CheckOutcome, id: &str) -> &'o str {
        outcome.statuses[id].details.as_deref().unwrap_or_default()
    }

    #[test]
    fn test_dependent_waits_for_provider() {
        let mut fx = Fixture::new();
        fx.package("a", &["b"]).package("b", &[]);

        let outcome = fx.run();

        assert_eq!(status(&outcome, "b"), PackageStatus::Building);
        assert_eq!(status(&outcome, "a"), PackageStatus::Blocked);
        assert_eq!(details(&outcome, "a"), "waiting for b");
        assert_eq!(outcome.assignments.len(), 1);
        assert_eq!(outcome.assignments[0].reason, BuildReason::NewBuild);
    }

    #[test]
    fn test_dependent_scheduled_after_provider_integrated() {
        let mut fx = Fixture::new();
        fx.package("a", &["b"]).package("b", &[]).binary("b");
        fx.finished
            .insert("b".to_string(), StatusEntry::new(PackageStatus::Succeeded));
        fx.dry_run = true;

        let outcome = fx.run();

        assert_eq!(status(&outcome, "b"), PackageStatus::Succeeded);
        assert_eq!(status(&outcome, "a"), PackageStatus::Scheduled);
    }

    #[test]
    fn test_single_builder_serializes() {
        let mut fx = Fixture::new();
        fx.package("x", &[]).package("y", &[]);

        let outcome = fx.run();

        assert_eq!(status(&outcome, "x"), PackageStatus::Building);
        assert_eq!(status(&outcome, "y"), PackageStatus::Blocked);
        assert_eq!(details(&outcome, "y"), "waiting for free builder");
        assert!(outcome.statuses["x"].details.is_none());
    }

    #[test]
    fn test_builder_label_with_multiple_builders() {
        let mut fx = Fixture::new();
        fx.builders = 2;
        fx.package("x", &[]).package("y", &[]);

        let outcome = fx.run();

        assert_eq!(details(&outcome, "x"), "builder1");
        assert_eq!(details(&outcome, "y"), "builder2");
    }

    #[test]
    fn test_running_job_reports_building() {
        let mut fx = Fixture::new();
        fx.package("x", &[]).package("y", &[]);
        fx.building.insert("y".to_string(), 0);

        let outcome = fx.run();

        assert_eq!(status(&outcome, "y"), PackageStatus::Building);
        assert_eq!(status(&outcome, "x"), PackageStatus::Blocked);
        assert!(outcome.assignments.is_empty());
    }

    #[test]
    fn test_directive_and_broken_statuses() {
        let mut fx = Fixture::new();
        fx.package("ok", &[]);
        let mut locked = Package::from_recipe(
            "frozen",
            Recipe::from_toml("[package]\nversion = \"1\"\n").unwrap(),
            HASH,
        );
        locked.error = Some(PackageError::Directive(Directive::Locked));
        fx.registry.insert(locked);
        let mut broken = Package::from_recipe(
            "bad",
            Recipe::from_toml("[package]\nversion = \"1\"\n").unwrap(),
            HASH,
        );
        broken.recipe = None;
        broken.error = Some(PackageError::Broken("parse error".to_string()));
        fx.registry.insert(broken);

        let outcome = fx.run();

        assert_eq!(status(&outcome, "frozen"), PackageStatus::Locked);
        assert_eq!(status(&outcome, "bad"), PackageStatus::Broken);
        assert_eq!(details(&outcome, "bad"), "parse error");
        assert_eq!(outcome.assignments.len(), 1);
    }

    #[test]
    fn test_unresolvable_dependency() {
        let mut fx = Fixture::new();
        fx.package("a", &["nothing-provides-this"]);

        let outcome = fx.run();

        assert_eq!(status(&outcome, "a"), PackageStatus::Unresolvable);
        assert_eq!(details(&outcome, "a"), "nothing provides nothing-provides-this");
    }

    #[test]
    fn test_unchanged_package_is_cached() {
        let mut fx = Fixture::new();
        fx.package("b", &[]).binary("b");
        let fp = fingerprint(HASH, &[]);
        fx.lastcheck.insert("b".to_string(), fp);

        let outcome = fx.run();

        assert_eq!(status(&outcome, "b"), PackageStatus::Succeeded);
        assert!(outcome.assignments.is_empty());
    }

    #[test]
    fn test_missing_binaries_forces_rebuild() {
        let mut fx = Fixture::new();
        fx.package("b", &[]);
        fx.lastcheck.insert("b".to_string(), fingerprint(HASH, &[]));

        let outcome = fx.run();

        assert_eq!(outcome.assignments[0].reason, BuildReason::MissingBinaries);
    }

    #[test]
    fn test_dependency_change_is_meta_change() {
        let mut fx = Fixture::new();
        fx.package("a", &["b"]).package("b", &[]).binary("b").binary("a");
        fx.lastcheck.insert("b".to_string(), fingerprint(HASH, &[]));
        fx.lastcheck
            .insert("a".to_string(), format!("{HASH}{}", "f".repeat(64)));

        let outcome = fx.run();

        assert_eq!(status(&outcome, "b"), PackageStatus::Succeeded);
        assert_eq!(outcome.assignments[0].package, "a");
        assert_eq!(outcome.assignments[0].reason, BuildReason::MetaChange);
    }

    #[test]
    fn test_finished_status_is_terminal() {
        let mut fx = Fixture::new();
        fx.package("x", &[]);
        fx.finished.insert(
            "x".to_string(),
            StatusEntry::with_details(PackageStatus::Failed, "exit status 1"),
        );

        let outcome = fx.run();

        assert_eq!(status(&outcome, "x"), PackageStatus::Failed);
        assert!(outcome.assignments.is_empty());
    }

    #[test]
    fn test_cycle_without_binaries_blocks_all() {
        let mut fx = Fixture::new();
        fx.package("a", &["b"]).package("b", &["c"]).package("c", &["a"]);

        for _ in 0..5 {
            let outcome = fx.run();
            for id in ["a", "b", "c"] {
                assert_eq!(status(&outcome, id), PackageStatus::Blocked);
            }
            assert!(outcome.assignments.is_empty());
        }

        let outcome = fx.run();
        assert!(details(&outcome, "a").starts_with("cycle stalled"));
    }

    #[test]
    fn test_cycle_with_binaries_builds_one_member_at_a_time() {
        let mut fx = Fixture::new();
        fx.builders = 2;
        fx.package("a", &["b"]).package("b", &["a"]).binary("a").binary("b");

        let outcome = fx.run();

        assert_eq!(outcome.assignments.len(), 1);
        assert_eq!(outcome.assignments[0].package, "a");
        assert_eq!(status(&outcome, "b"), PackageStatus::Blocked);
        assert_eq!(details(&outcome, "b"), "cycle member a building");
    }

    #[test]
    fn test_fingerprint_shape() {
        let fp = fingerprint(HASH, &[]);
        assert_eq!(fp.len(), 128);
        assert!(fp.starts_with(HASH));
    }
}
