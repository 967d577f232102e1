//! Dependency expression evaluation
//!
//! The [`DependencyOracle`] answers one question: can a package's declared
//! requirements be satisfied by the packages under build and the binaries in
//! the repository pool, and by whom. The engine treats it as a black box.

use regex::Regex;
use semver::Version;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::core::package::PackageRegistry;
use crate::core::repository::{BinaryRef, RepositoryPool};
use crate::core::status::PackageStatus;
use crate::error::ResolverError;

/// One evaluated requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDep {
    /// Required name
    pub name: String,
    /// Package under build that produces the name
    pub producer: Option<String>,
    /// Binary currently available for the name
    pub binary: Option<BinaryRef>,
}

impl ResolvedDep {
    /// Whether a binary is available right now
    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }
}

/// A package under build that declares a provided name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Producer {
    /// Producing package id
    pub package: String,
    /// Its recipe version
    pub version: String,
}

/// Provided name → packages under build that produce it
#[derive(Debug, Clone, Default)]
pub struct Producers {
    by_name: BTreeMap<String, Vec<Producer>>,
}

impl Producers {
    /// Collect producers from every package whose outputs are used for builds
    ///
    /// Packages that will not be built this run do not produce anything,
    /// except locked ones whose existing binaries stay available.
    pub fn from_registry(registry: &PackageRegistry) -> Self {
        let mut producers = Self::default();
        for package in registry.iter() {
            let Some(recipe) = &package.recipe else {
                continue;
            };
            if package
                .error
                .as_ref()
                .is_some_and(|e| e.status() != PackageStatus::Locked)
            {
                continue;
            }
            if !recipe.build.use_for_build {
                continue;
            }
            for name in recipe.provided_names(&package.id) {
                producers.by_name.entry(name).or_default().push(Producer {
                    package: package.id.clone(),
                    version: recipe.package.version.clone(),
                });
            }
        }
        producers
    }

    /// Producers of `name`
    pub fn get(&self, name: &str) -> &[Producer] {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }
}

/// Evaluates dependency expressions against the pool
pub trait DependencyOracle: Send + Sync {
    /// Expand `requirements` of `requester`
    fn expand(
        &self,
        requester: &str,
        requirements: &[String],
        producers: &Producers,
        pool: &RepositoryPool,
    ) -> Result<Vec<ResolvedDep>, ResolverError>;
}

/// Version comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

/// A parsed dependency expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Required name
    pub name: String,
    /// Optional version constraint
    pub constraint: Option<(Op, String)>,
}

fn expression_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z0-9_.+:/@-]+)\s*(?:(<=|>=|==|=|<|>)\s*([A-Za-z0-9_.+~-]+))?\s*$")
            .expect("dependency expression regex is valid")
    })
}

impl Requirement {
    /// Parse `name [op version]`
    pub fn parse(expression: &str) -> Result<Self, ResolverError> {
        let invalid = || ResolverError::InvalidExpression {
            expression: expression.to_string(),
        };
        let caps = expression_regex().captures(expression).ok_or_else(invalid)?;

        let name = caps[1].to_string();
        let constraint = match (caps.get(2), caps.get(3)) {
            (Some(op), Some(version)) => {
                let op = match op.as_str() {
                    "<" => Op::Lt,
                    "<=" => Op::Le,
                    "=" | "==" => Op::Eq,
                    ">=" => Op::Ge,
                    ">" => Op::Gt,
                    _ => return Err(invalid()),
                };
                Some((op, version.as_str().to_string()))
            }
            _ => None,
        };

        Ok(Self { name, constraint })
    }

    /// Whether `version` satisfies the constraint
    pub fn matches(&self, version: &str) -> bool {
        let Some((op, wanted)) = &self.constraint else {
            return true;
        };

        match (parse_version(version), parse_version(wanted)) {
            (Some(have), Some(want)) => match op {
                Op::Lt => have < want,
                Op::Le => have <= want,
                Op::Eq => have == want,
                Op::Ge => have >= want,
                Op::Gt => have > want,
            },
            _ => *op == Op::Eq && version == wanted,
        }
    }
}

/// Lenient semver parsing: "2" and "2.1" are padded to three components
pub fn parse_version(version: &str) -> Option<Version> {
    if let Ok(v) = Version::parse(version) {
        return Some(v);
    }
    let split = version.find(['-', '+']).unwrap_or(version.len());
    let (core, rest) = version.split_at(split);
    let padded = match core.matches('.').count() {
        0 => format!("{core}.0.0"),
        1 => format!("{core}.0"),
        _ => return None,
    };
    Version::parse(&format!("{padded}{rest}")).ok()
}

/// Default oracle: name/version matching against producers and pool
#[derive(Debug, Default, Clone, Copy)]
pub struct RequirementOracle;

impl DependencyOracle for RequirementOracle {
    fn expand(
        &self,
        requester: &str,
        requirements: &[String],
        producers: &Producers,
        pool: &RepositoryPool,
    ) -> Result<Vec<ResolvedDep>, ResolverError> {
        let mut resolved = Vec::with_capacity(requirements.len());

        for expression in requirements {
            let req = Requirement::parse(expression)?;

            let all_producers = producers.get(&req.name);
            let self_provided = all_producers.iter().any(|p| p.package == requester);
            let candidates: Vec<&Producer> = all_producers
                .iter()
                .filter(|p| p.package != requester && req.matches(&p.version))
                .collect();
            if candidates.len() > 1 {
                return Err(ResolverError::Ambiguous {
                    name: req.name,
                    candidates: candidates.iter().map(|p| p.package.clone()).collect(),
                });
            }

            let binary = find_binary(requester, &req, pool)?;

            if candidates.is_empty() && binary.is_none() {
                if self_provided {
                    continue;
                }
                return Err(ResolverError::NothingProvides { name: req.name });
            }

            resolved.push(ResolvedDep {
                name: req.name,
                producer: candidates.first().map(|p| p.package.clone()),
                binary,
            });
        }

        Ok(resolved)
    }
}

/// First binary in pool order satisfying `req`, ignoring the requester's own
fn find_binary(
    requester: &str,
    req: &Requirement,
    pool: &RepositoryPool,
) -> Result<Option<BinaryRef>, ResolverError> {
    for repo in pool.iter() {
        let matching: Vec<_> = repo
            .lookup(&req.name)
            .iter()
            .filter(|m| m.package != requester && req.matches(&m.version))
            .collect();
        let Some(first) = matching.first() else {
            continue;
        };

        let mut origins: Vec<String> = matching.iter().map(|m| m.package.clone()).collect();
        origins.sort();
        origins.dedup();
        if origins.len() > 1 {
            return Err(ResolverError::Ambiguous {
                name: req.name.clone(),
                candidates: origins,
            });
        }

        return Ok(Some(BinaryRef {
            repo: repo.name.clone(),
            meta: (*first).clone(),
        }));
    }
    Ok(None)
}
