//! Repository sources and the repository pool
//!
//! A [`Repository`] maps provided names to binary metadata. The pool is
//! ordered: the local repository comes first, remote sources follow in
//! configured order. Only the local repository is ever written.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::error::{RepositoryError, StoreError};
use crate::infra::filesystem;

/// Kind of binary source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    /// Local build output, written by the artifact integrator
    Local,
    /// Remote package repository
    #[serde(rename = "repo")]
    RemoteRepo,
    /// Remote container registry
    #[serde(rename = "registry")]
    RemoteRegistry,
}

/// Metadata of one provided binary or container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryMeta {
    /// Provided name
    pub name: String,
    /// Version of the producing package
    pub version: String,
    /// Package that produced it
    pub package: String,
    /// Artifact files (absolute for the local repository)
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Checksum over the artifact content
    #[serde(default)]
    pub checksum: String,
}

/// Serialized form of a repository index
///
/// Container registries list their entries under `containers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryIndex {
    /// Every provided binary
    #[serde(default, alias = "containers")]
    pub binaries: Vec<BinaryMeta>,
}

/// A resolved reference to a binary in a specific source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRef {
    /// Name of the repository it was found in
    pub repo: String,
    /// Binary metadata
    pub meta: BinaryMeta,
}

/// One binary source
#[derive(Debug, Clone)]
pub struct Repository {
    /// Source name
    pub name: String,
    /// Storage location (repository dir or snapshot file)
    pub location: PathBuf,
    /// Remote URL
    pub url: Option<String>,
    /// Source kind
    pub kind: RepoKind,
    provides: BTreeMap<String, Vec<BinaryMeta>>,
}

impl Repository {
    /// Create an empty repository
    pub fn new(name: &str, location: PathBuf, kind: RepoKind) -> Self {
        Self {
            name: name.to_string(),
            location,
            url: None,
            kind,
            provides: BTreeMap::new(),
        }
    }

    /// Set the remote URL
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Populate from an index
    #[must_use]
    pub fn with_index(mut self, index: RepositoryIndex) -> Self {
        for meta in index.binaries {
            self.add(meta);
        }
        self
    }

    /// Add one binary
    pub fn add(&mut self, meta: BinaryMeta) {
        self.provides.entry(meta.name.clone()).or_default().push(meta);
    }

    /// Binaries providing `name`
    pub fn lookup(&self, name: &str) -> &[BinaryMeta] {
        self.provides.get(name).map_or(&[], Vec::as_slice)
    }

    /// Every binary, ordered by name
    pub fn binaries(&self) -> impl Iterator<Item = &BinaryMeta> {
        self.provides.values().flatten()
    }

    /// Number of provided names
    pub fn len(&self) -> usize {
        self.provides.len()
    }

    /// Whether nothing is provided
    pub fn is_empty(&self) -> bool {
        self.provides.is_empty()
    }

    /// Whether any binary of `package` is present
    pub fn has_package(&self, package: &str) -> bool {
        self.binaries().any(|m| m.package == package)
    }

    /// Binaries produced by `package`
    pub fn package_binaries(&self, package: &str) -> Vec<&BinaryMeta> {
        self.binaries().filter(|m| m.package == package).collect()
    }

    /// Replace everything `package` provides
    pub fn replace_package(&mut self, package: &str, metas: Vec<BinaryMeta>) {
        for entries in self.provides.values_mut() {
            entries.retain(|m| m.package != package);
        }
        self.provides.retain(|_, entries| !entries.is_empty());
        for meta in metas {
            self.add(meta);
        }
    }

    /// Index form of this repository
    pub fn to_index(&self) -> RepositoryIndex {
        RepositoryIndex {
            binaries: self.binaries().cloned().collect(),
        }
    }

    /// Load the local repository rooted at `dir`
    ///
    /// A missing index means an empty repository.
    pub fn load_local(dir: &Path) -> Result<Self, RepositoryError> {
        let repo = Self::new("local", dir.to_path_buf(), RepoKind::Local);
        let index_path = dir.join(defaults::REPO_INDEX_FILE);
        if !index_path.exists() {
            return Ok(repo);
        }

        let content = filesystem::read_file(&index_path)?;
        let index: RepositoryIndex =
            serde_json::from_str(&content).map_err(|e| RepositoryError::InvalidIndex {
                source_name: index_path.display().to_string(),
                error: e.to_string(),
            })?;
        Ok(repo.with_index(index))
    }

    /// Persist the local repository index atomically
    pub fn save_index(&self) -> Result<(), StoreError> {
        let path = self.location.join(defaults::REPO_INDEX_FILE);
        let json =
            serde_json::to_vec_pretty(&self.to_index()).map_err(|e| StoreError::Serialize {
                path: path.clone(),
                error: e.to_string(),
            })?;
        filesystem::write_file_atomic(&path, &json).map_err(|e| StoreError::Persist {
            path,
            error: e.to_string(),
        })
    }
}

/// Ordered list of binary sources, local repository first
#[derive(Debug, Clone)]
pub struct RepositoryPool {
    repos: Vec<Repository>,
}

impl RepositoryPool {
    /// Create a pool around the local repository
    pub fn new(local: Repository) -> Self {
        Self { repos: vec![local] }
    }

    /// Append a remote source
    pub fn push(&mut self, repo: Repository) {
        self.repos.push(repo);
    }

    /// The local repository
    pub fn local(&self) -> &Repository {
        &self.repos[0]
    }

    /// The local repository, mutably
    pub fn local_mut(&mut self) -> &mut Repository {
        &mut self.repos[0]
    }

    /// All sources in pool order
    pub fn iter(&self) -> impl Iterator<Item = &Repository> {
        self.repos.iter()
    }

    /// The first source providing `name`, with its candidates
    pub fn first_providing(&self, name: &str) -> Option<(&Repository, &[BinaryMeta])> {
        self.repos.iter().find_map(|repo| {
            let found = repo.lookup(name);
            (!found.is_empty()).then_some((repo, found))
        })
    }

    /// Every source providing `name`, in pool order
    pub fn providers(&self, name: &str) -> Vec<(&Repository, &BinaryMeta)> {
        self.repos
            .iter()
            .flat_map(|repo| repo.lookup(name).iter().map(move |meta| (repo, meta)))
            .collect()
    }
}
