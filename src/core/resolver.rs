//! Dependency resolution
//!
//! Expands each package's dependency expressions against the repository
//! pool, builds the package → package graph, detects cycles and computes the
//! build order.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::core::oracle::{DependencyOracle, Producers, ResolvedDep};
use crate::core::package::PackageRegistry;
use crate::core::repository::RepositoryPool;
use crate::error::ResolverError;

/// A set of mutually dependent packages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    /// Stable identifier within one graph
    pub id: usize,
    /// Members, sorted by package id
    pub members: Vec<String>,
}

impl Cycle {
    /// Whether `package` belongs to the cycle
    pub fn contains(&self, package: &str) -> bool {
        self.members.binary_search_by(|m| m.as_str().cmp(package)).is_ok()
    }

    /// Display form, e.g. `a -> b -> c`
    pub fn describe(&self) -> String {
        self.members.join(" -> ")
    }
}

/// Dependency graph for packages
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Adjacency list: package -> packages it depends on
    edges: BTreeMap<String, BTreeSet<String>>,
    /// Expansion result per package that is built this run
    expansions: BTreeMap<String, Result<Vec<ResolvedDep>, ResolverError>>,
    /// Detected cycles
    cycles: Vec<Cycle>,
    /// Package -> index into `cycles`
    cycle_of: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand every package against the pool and build the graph
    ///
    /// Expansion errors are stored on the package's entry, never returned.
    pub fn build(
        registry: &PackageRegistry,
        pool: &RepositoryPool,
        oracle: &dyn DependencyOracle,
    ) -> Self {
        let producers = Producers::from_registry(registry);
        let mut graph = Self::new();

        for package in registry.iter() {
            graph.edges.entry(package.id.clone()).or_default();

            let Some(recipe) = &package.recipe else {
                continue;
            };
            if package.error.is_some() {
                continue;
            }

            let expansion =
                oracle.expand(&package.id, &recipe.package.depends, &producers, pool);

            if let Ok(deps) = &expansion {
                let providers = deps
                    .iter()
                    .filter_map(|d| d.producer.clone())
                    .filter(|p| p != &package.id && registry.get(p).is_some())
                    .collect::<Vec<_>>();
                graph.add_package(&package.id, providers);
            } else {
                tracing::debug!("Expansion of {} failed: {:?}", package.id, expansion);
            }
            graph.expansions.insert(package.id.clone(), expansion);
        }

        graph.detect_cycles();
        graph
    }

    /// Add a package with the packages it depends on
    pub fn add_package(&mut self, name: &str, dependencies: Vec<String>) {
        for dep in &dependencies {
            self.edges.entry(dep.clone()).or_default();
        }
        self.edges
            .entry(name.to_string())
            .or_default()
            .extend(dependencies);
    }

    /// Find strongly connected components of size > 1
    pub fn detect_cycles(&mut self) {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();
        for name in self.edges.keys() {
            index.insert(name.as_str(), graph.add_node(name.as_str()));
        }
        for (consumer, providers) in &self.edges {
            for provider in providers {
                graph.add_edge(index[consumer.as_str()], index[provider.as_str()], ());
            }
        }

        let mut components: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|c| c.len() > 1)
            .map(|c| {
                let mut members: Vec<String> = c.iter().map(|&n| graph[n].to_string()).collect();
                members.sort();
                members
            })
            .collect();
        components.sort();

        self.cycles = components
            .into_iter()
            .enumerate()
            .map(|(id, members)| Cycle { id, members })
            .collect();
        self.cycle_of = self
            .cycles
            .iter()
            .flat_map(|c| c.members.iter().map(move |m| (m.clone(), c.id)))
            .collect();
    }

    /// Expansion result of a package, if it was expanded
    pub fn expansion(&self, package: &str) -> Option<&Result<Vec<ResolvedDep>, ResolverError>> {
        self.expansions.get(package)
    }

    /// Packages `package` depends on
    pub fn dependencies(&self, package: &str) -> impl Iterator<Item = &String> {
        self.edges.get(package).into_iter().flatten()
    }

    /// Detected cycles
    pub fn cycles(&self) -> &[Cycle] {
        &self.cycles
    }

    /// The cycle `package` belongs to
    pub fn cycle_of(&self, package: &str) -> Option<&Cycle> {
        self.cycle_of.get(package).map(|&i| &self.cycles[i])
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Compute the build order (pkgsort)
    ///
    /// Providers come before consumers for every edge outside a cycle, the
    /// members of a cycle are contiguous, and otherwise unordered packages
    /// are taken by smallest package id.
    pub fn sort(&self) -> Vec<String> {
        // Each cycle is one unit, every other package is its own unit.
        let mut units: Vec<Vec<String>> = self.cycles.iter().map(|c| c.members.clone()).collect();
        units.extend(
            self.edges
                .keys()
                .filter(|name| !self.cycle_of.contains_key(name.as_str()))
                .map(|name| vec![name.clone()]),
        );
        let unit_of: HashMap<&str, usize> = units
            .iter()
            .enumerate()
            .flat_map(|(i, unit)| unit.iter().map(move |member| (member.as_str(), i)))
            .collect();

        let mut pending = vec![0usize; units.len()];
        let mut consumers: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); units.len()];
        for (consumer, providers) in &self.edges {
            let cu = unit_of[consumer.as_str()];
            for provider in providers {
                let pu = unit_of[provider.as_str()];
                if pu != cu && consumers[pu].insert(cu) {
                    pending[cu] += 1;
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<(String, usize)>> = units
            .iter()
            .enumerate()
            .filter(|(i, _)| pending[*i] == 0)
            .map(|(i, unit)| Reverse((unit[0].clone(), i)))
            .collect();

        let mut order = Vec::with_capacity(self.edges.len());
        while let Some(Reverse((_, unit))) = ready.pop() {
            order.extend(units[unit].iter().cloned());
            for &consumer in &consumers[unit] {
                pending[consumer] -= 1;
                if pending[consumer] == 0 {
                    ready.push(Reverse((units[consumer][0].clone(), consumer)));
                }
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::oracle::RequirementOracle;
    use crate::core::package::{Package, Recipe};
    use crate::core::repository::{RepoKind, Repository};
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|x| x == name).unwrap()
    }

    fn graph_of(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (name, deps) in edges {
            graph.add_package(name, deps.iter().map(ToString::to_string).collect());
        }
        graph.detect_cycles();
        graph
    }

    #[test]
    fn test_simple_dependency_order() {
        let graph = graph_of(&[("app", &["lib"]), ("lib", &[])]);

        let order = graph.sort();
        assert!(position(&order, "lib") < position(&order, "app"), "lib should be built before app");
    }

    #[test]
    fn test_ties_broken_by_id() {
        let graph = graph_of(&[("c", &[]), ("a", &[]), ("b", &[])]);
        assert_eq!(graph.sort(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_circular_dependency_detection() {
        let graph = graph_of(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &[])]);

        assert!(graph.has_cycle());
        assert_eq!(graph.cycles().len(), 1);
        assert_eq!(graph.cycles()[0].members, vec!["a", "b", "c"]);
        assert!(graph.cycle_of("b").is_some());
        assert!(graph.cycle_of("d").is_none());
        assert_eq!(graph.sort().len(), 4);
    }

    #[test]
    fn test_cycle_members_contiguous_and_after_providers() {
        let graph = graph_of(&[
            ("a", &["b", "base"]),
            ("b", &["a"]),
            ("base", &[]),
            ("app", &["a"]),
            ("0first", &[]),
        ]);

        let order = graph.sort();
        let pa = position(&order, "a");
        let pb = position(&order, "b");
        assert_eq!(pa.abs_diff(pb), 1);
        assert!(position(&order, "base") < pa.min(pb));
        assert!(position(&order, "app") > pa.max(pb));
    }

    #[test]
    fn test_build_from_registry() {
        let mut registry = PackageRegistry::new();
        for (id, deps) in [("a", "[\"b\"]"), ("b", "[]"), ("c", "[\"nothing\"]")] {
            let recipe =
                Recipe::from_toml(&format!("[package]\nversion = \"1\"\ndepends = {deps}\n"))
                    .unwrap();
            registry.insert(Package::from_recipe(id, recipe, "h"));
        }
        let pool = RepositoryPool::new(Repository::new("local", PathBuf::from("/r"), RepoKind::Local));

        let graph = DependencyGraph::build(&registry, &pool, &RequirementOracle);

        assert_eq!(graph.dependencies("a").collect::<Vec<_>>(), vec!["b"]);
        assert!(graph.expansion("a").unwrap().is_ok());
        assert!(graph.expansion("c").unwrap().is_err());
        assert_eq!(graph.sort(), vec!["b", "a", "c"]);
    }

    fn arbitrary_edges() -> impl Strategy<Value = Vec<(usize, usize)>> {
        prop::collection::vec((0usize..12, 0usize..12), 0..30)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_sort_respects_edges_and_keeps_cycles_contiguous(edges in arbitrary_edges()) {
            let mut graph = DependencyGraph::new();
            for i in 0..12 {
                graph.add_package(&format!("p{i:02}"), Vec::new());
            }
            for (from, to) in &edges {
                if from != to {
                    graph.add_package(&format!("p{from:02}"), vec![format!("p{to:02}")]);
                }
            }
            graph.detect_cycles();

            let order = graph.sort();
            prop_assert_eq!(order.len(), 12);

            for (from, to) in &edges {
                let consumer = format!("p{from:02}");
                let provider = format!("p{to:02}");
                let same_cycle = graph
                    .cycle_of(&consumer)
                    .is_some_and(|c| c.contains(&provider));
                if from != to && !same_cycle {
                    prop_assert!(position(&order, &provider) < position(&order, &consumer));
                }
            }

            for cycle in graph.cycles() {
                let mut positions: Vec<usize> =
                    cycle.members.iter().map(|m| position(&order, m)).collect();
                positions.sort_unstable();
                prop_assert_eq!(positions[positions.len() - 1] - positions[0], positions.len() - 1);
            }
        }
    }
}
