//! Package registry and recipe handling
//!
//! Discovers package directories, parses their `package.toml` recipes and
//! keeps per-package error state. The registry is created once per run; only
//! the error and fingerprint fields of a package are refreshed between
//! passes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::status::PackageStatus;
use crate::error::{PkgforgeError, RecipeError};
use crate::infra::filesystem;

/// Parsed package recipe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipe {
    /// Package metadata
    pub package: RecipeMetadata,

    /// Build configuration
    #[serde(default)]
    pub build: RecipeBuild,
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeMetadata {
    /// Display name (the package id is the directory name)
    #[serde(default)]
    pub name: Option<String>,

    /// Package version
    pub version: String,

    /// Description
    #[serde(default)]
    pub description: Option<String>,

    /// Build dependency expressions (`name [op version]`)
    #[serde(default)]
    pub depends: Vec<String>,

    /// Names this package makes available to others
    #[serde(default)]
    pub provides: Vec<String>,

    /// Supported architectures (empty = all)
    #[serde(default)]
    pub arch: Vec<String>,
}

/// Build section of a recipe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeBuild {
    /// Build system type (informational)
    #[serde(rename = "type")]
    #[serde(default)]
    pub build_type: Option<String>,

    /// Build script relative to the package directory
    #[serde(default)]
    pub script: Option<String>,

    /// Whether the outputs feed other packages' builds
    #[serde(default = "default_true")]
    pub use_for_build: bool,

    /// Policy directive
    #[serde(default)]
    pub directive: Option<Directive>,

    /// Glob patterns selecting artifacts from the result directory
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl Default for RecipeBuild {
    fn default() -> Self {
        Self {
            build_type: None,
            script: None,
            use_for_build: true,
            directive: None,
            outputs: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Recipe policy directive
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Directive {
    /// Not built for this configuration
    Excluded,
    /// Switched off by the maintainer
    Disabled,
    /// Existing binaries are frozen
    Locked,
}

impl Recipe {
    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, RecipeError> {
        let recipe: Self =
            toml::from_str(content).map_err(|e| RecipeError::ParseError(e.to_string()))?;
        if recipe.package.version.trim().is_empty() {
            return Err(RecipeError::MissingField {
                field: "package.version".to_string(),
            });
        }
        Ok(recipe)
    }

    /// Names provided to other packages, defaulting to the package id
    pub fn provided_names(&self, id: &str) -> Vec<String> {
        if self.package.provides.is_empty() {
            vec![id.to_string()]
        } else {
            self.package.provides.clone()
        }
    }

    /// Build script path relative to the package directory
    pub fn script(&self) -> &str {
        self.build.script.as_deref().unwrap_or(defaults::BUILD_SCRIPT)
    }
}

/// Why a package will not be built
#[derive(Debug, Clone, PartialEq)]
pub enum PackageError {
    /// Recipe directive
    Directive(Directive),
    /// Target architecture not in the recipe's arch list
    UnsupportedArch(String),
    /// Recipe could not be parsed
    Broken(String),
}

impl PackageError {
    /// Terminal status this error maps to
    pub fn status(&self) -> PackageStatus {
        match self {
            Self::Directive(Directive::Excluded) | Self::UnsupportedArch(_) => {
                PackageStatus::Excluded
            }
            Self::Directive(Directive::Disabled) => PackageStatus::Disabled,
            Self::Directive(Directive::Locked) => PackageStatus::Locked,
            Self::Broken(_) => PackageStatus::Broken,
        }
    }

    /// Detail string for the Result Store
    pub fn details(&self) -> Option<String> {
        match self {
            Self::Directive(_) => None,
            Self::UnsupportedArch(arch) => Some(format!("not built for {arch}")),
            Self::Broken(msg) => Some(msg.clone()),
        }
    }
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.details() {
            Some(details) => write!(f, "{}: {details}", self.status()),
            None => write!(f, "{}", self.status()),
        }
    }
}

/// Parses a package directory into a recipe
pub trait RecipeParser: Send + Sync {
    /// Parse the recipe found in `dir`
    fn parse(&self, dir: &Path) -> Result<Recipe, RecipeError>;
}

/// Reads `package.toml` from the package directory
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlRecipeParser;

impl RecipeParser for TomlRecipeParser {
    fn parse(&self, dir: &Path) -> Result<Recipe, RecipeError> {
        let path = dir.join(defaults::RECIPE_FILE);
        if !path.exists() {
            return Err(RecipeError::NotFound { path });
        }
        let content = std::fs::read_to_string(&path).map_err(|e| RecipeError::Unreadable {
            path: path.clone(),
            error: e.to_string(),
        })?;
        Recipe::from_toml(&content)
    }
}

/// One buildable unit
#[derive(Debug, Clone)]
pub struct Package {
    /// Package id (directory name)
    pub id: String,
    /// Package directory
    pub dir: PathBuf,
    /// Parsed recipe, absent when broken
    pub recipe: Option<Recipe>,
    /// Hash over the package's source file set
    pub source_hash: String,
    /// Reason the package is not built
    pub error: Option<PackageError>,
}

impl Package {
    /// Load a package from its directory
    pub fn load(id: &str, dir: &Path, parser: &dyn RecipeParser, arch: &str) -> Self {
        let source_hash = filesystem::hash_tree(dir).unwrap_or_default();
        let mut package = Self {
            id: id.to_string(),
            dir: dir.to_path_buf(),
            recipe: None,
            source_hash,
            error: None,
        };

        match parser.parse(dir) {
            Ok(recipe) => {
                package.error = classify(&recipe, arch);
                package.recipe = Some(recipe);
            }
            Err(e) => package.error = Some(PackageError::Broken(e.to_string())),
        }

        if package.source_hash.is_empty() && package.error.is_none() {
            package.error = Some(PackageError::Broken("cannot read sources".to_string()));
        }

        package
    }

    /// Build a package from an in-memory recipe
    pub fn from_recipe(id: &str, recipe: Recipe, source_hash: &str) -> Self {
        Self {
            id: id.to_string(),
            dir: PathBuf::from(id),
            recipe: Some(recipe),
            source_hash: source_hash.to_string(),
            error: None,
        }
    }

    /// Whether this package's outputs are used by other builds
    pub fn use_for_build(&self) -> bool {
        self.recipe.as_ref().is_some_and(|r| r.build.use_for_build)
    }

    /// Version from the recipe
    pub fn version(&self) -> Option<&str> {
        self.recipe.as_ref().map(|r| r.package.version.as_str())
    }
}

fn classify(recipe: &Recipe, arch: &str) -> Option<PackageError> {
    if let Some(directive) = recipe.build.directive {
        return Some(PackageError::Directive(directive));
    }
    if !recipe.package.arch.is_empty() && !recipe.package.arch.iter().any(|a| a == arch) {
        return Some(PackageError::UnsupportedArch(arch.to_string()));
    }
    None
}

/// Catalogue of all packages discovered for a run
#[derive(Debug, Default, Clone)]
pub struct PackageRegistry {
    packages: BTreeMap<String, Package>,
}

impl PackageRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover every package directory below `packages_dir`
    ///
    /// Failing to list the directory is fatal; problems with individual
    /// packages are recorded on the package.
    pub fn discover(
        packages_dir: &Path,
        parser: &dyn RecipeParser,
        arch: &str,
    ) -> Result<Self, PkgforgeError> {
        let registry_err = |e: std::io::Error| PkgforgeError::Registry {
            path: packages_dir.to_path_buf(),
            error: e.to_string(),
        };

        let mut registry = Self::new();
        for entry in std::fs::read_dir(packages_dir).map_err(registry_err)? {
            let entry = entry.map_err(registry_err)?;
            if !entry.file_type().map_err(registry_err)?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            if id.starts_with('.') || id.starts_with('_') {
                continue;
            }
            registry.insert(Package::load(&id, &entry.path(), parser, arch));
        }

        tracing::info!(
            "Discovered {} packages in {}",
            registry.len(),
            packages_dir.display()
        );
        Ok(registry)
    }

    /// Add or replace a package
    pub fn insert(&mut self, package: Package) {
        self.packages.insert(package.id.clone(), package);
    }

    /// Look up a package
    pub fn get(&self, id: &str) -> Option<&Package> {
        self.packages.get(id)
    }

    /// Iterate packages in id order
    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    /// Package ids in sorted order
    pub fn ids(&self) -> Vec<String> {
        self.packages.keys().cloned().collect()
    }

    /// Number of packages
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Re-read broken packages whose sources changed
    ///
    /// Returns the ids that were reloaded.
    pub fn refresh_broken(&mut self, parser: &dyn RecipeParser, arch: &str) -> Vec<String> {
        let mut reloaded = Vec::new();
        for package in self.packages.values_mut() {
            if !matches!(package.error, Some(PackageError::Broken(_))) {
                continue;
            }
            let Ok(hash) = filesystem::hash_tree(&package.dir) else {
                continue;
            };
            if hash == package.source_hash {
                continue;
            }
            tracing::info!("Sources of broken package {} changed, re-parsing", package.id);
            *package = Package::load(&package.id, &package.dir, parser, arch);
            reloaded.push(package.id.clone());
        }
        reloaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RECIPE: &str = r#"
[package]
version = "1.2.3"
depends = ["zlib >= 1.2", "libc"]
provides = ["busybox", "sh"]

[build]
type = "make"
"#;

    fn write_package(root: &Path, id: &str, recipe: &str) -> PathBuf {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("package.toml"), recipe).unwrap();
        std::fs::write(dir.join("build.sh"), "#!/bin/sh\n").unwrap();
        dir
    }

    #[test]
    fn test_recipe_parses() {
        let recipe = Recipe::from_toml(RECIPE).unwrap();
        assert_eq!(recipe.package.version, "1.2.3");
        assert_eq!(recipe.package.depends, vec!["zlib >= 1.2", "libc"]);
        assert_eq!(recipe.build.build_type.as_deref(), Some("make"));
        assert!(recipe.build.use_for_build);
        assert_eq!(recipe.script(), "build.sh");
    }

    #[test]
    fn test_provided_names_default_to_id() {
        let recipe = Recipe::from_toml("[package]\nversion = \"1\"\n").unwrap();
        assert_eq!(recipe.provided_names("zlib"), vec!["zlib"]);

        let recipe = Recipe::from_toml(RECIPE).unwrap();
        assert_eq!(recipe.provided_names("busybox"), vec!["busybox", "sh"]);
    }

    #[test]
    fn test_missing_version_is_error() {
        let result = Recipe::from_toml("[package]\nversion = \"\"\n");
        assert!(matches!(result, Err(RecipeError::MissingField { .. })));
    }

    #[test]
    fn test_directive_maps_to_status() {
        let temp = TempDir::new().unwrap();
        let dir = write_package(
            temp.path(),
            "old",
            "[package]\nversion = \"1\"\n[build]\ndirective = \"locked\"\n",
        );

        let package = Package::load("old", &dir, &TomlRecipeParser, "x86_64");
        assert_eq!(package.error.unwrap().status(), PackageStatus::Locked);
    }

    #[test]
    fn test_unsupported_arch_is_excluded() {
        let temp = TempDir::new().unwrap();
        let dir = write_package(
            temp.path(),
            "armonly",
            "[package]\nversion = \"1\"\narch = [\"aarch64\"]\n",
        );

        let package = Package::load("armonly", &dir, &TomlRecipeParser, "x86_64");
        let error = package.error.unwrap();
        assert_eq!(error.status(), PackageStatus::Excluded);
        assert_eq!(error.details().as_deref(), Some("not built for x86_64"));
    }

    #[test]
    fn test_unparsable_recipe_is_broken() {
        let temp = TempDir::new().unwrap();
        let dir = write_package(temp.path(), "bad", "[package\nversion=");

        let package = Package::load("bad", &dir, &TomlRecipeParser, "x86_64");
        assert!(package.recipe.is_none());
        assert_eq!(package.error.unwrap().status(), PackageStatus::Broken);
    }

    #[test]
    fn test_discover_skips_files_and_hidden_dirs() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "a", RECIPE);
        write_package(temp.path(), "b", RECIPE);
        std::fs::create_dir(temp.path().join(".hidden")).unwrap();
        std::fs::write(temp.path().join("README"), "x").unwrap();

        let registry = PackageRegistry::discover(temp.path(), &TomlRecipeParser, "x86_64").unwrap();
        assert_eq!(registry.ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_discover_missing_dir_is_fatal() {
        let temp = TempDir::new().unwrap();
        let result =
            PackageRegistry::discover(&temp.path().join("nope"), &TomlRecipeParser, "x86_64");
        assert!(matches!(result, Err(PkgforgeError::Registry { .. })));
    }

    #[test]
    fn test_refresh_broken_reloads_fixed_recipe() {
        let temp = TempDir::new().unwrap();
        let dir = write_package(temp.path(), "bad", "not toml [");
        let mut registry = PackageRegistry::discover(temp.path(), &TomlRecipeParser, "x86_64").unwrap();
        assert!(registry.refresh_broken(&TomlRecipeParser, "x86_64").is_empty());

        std::fs::write(dir.join("package.toml"), "[package]\nversion = \"1\"\n").unwrap();
        let reloaded = registry.refresh_broken(&TomlRecipeParser, "x86_64");

        assert_eq!(reloaded, vec!["bad"]);
        assert!(registry.get("bad").unwrap().error.is_none());
    }
}
