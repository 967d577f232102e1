//! Error types for pkgforge
//!
//! Domain-specific error types using thiserror.
//!
//! Per-package conditions (broken recipes, unresolvable dependencies, failed
//! builds) are not errors at this level: they are recorded as package
//! statuses. The types here cover collaborator failures and the few
//! conditions that stop a run.

use std::path::PathBuf;
use thiserror::Error;

/// Recipe parsing errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecipeError {
    /// Recipe file is missing
    #[error("No recipe found at '{path}'")]
    NotFound { path: PathBuf },

    /// Recipe file could not be read
    #[error("Failed to read recipe '{path}': {error}")]
    Unreadable { path: PathBuf, error: String },

    /// Recipe is not valid TOML or does not match the schema
    #[error("Failed to parse recipe: {0}")]
    ParseError(String),

    /// Missing required field
    #[error("Recipe is missing required field '{field}'")]
    MissingField { field: String },
}

/// Dependency resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// Nothing in the pool or the registry provides a name
    #[error("nothing provides {name}")]
    NothingProvides { name: String },

    /// More than one candidate provides a name
    #[error("have choice for {name}: {}", candidates.join(", "))]
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },

    /// Dependency expression could not be parsed
    #[error("invalid dependency expression '{expression}'")]
    InvalidExpression { expression: String },
}

/// Repository fetch and index errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Network error
    #[error("Network error fetching '{url}': {error}")]
    NetworkError { url: String, error: String },

    /// Remote answered with an error status
    #[error("Fetching '{url}' failed with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    /// Index content is malformed
    #[error("Invalid repository index '{source_name}': {error}")]
    InvalidIndex { source_name: String, error: String },

    /// Neither url nor path configured
    #[error("Repository '{name}' has neither url nor path")]
    NoLocation { name: String },

    /// Filesystem error while reading or writing an index
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to move a file into place
    #[error("Failed to move '{from}' to '{to}': {error}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
}

/// Build job errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// Builder slot is already occupied
    #[error("Builder {builder} is busy with '{package}'")]
    BuilderBusy { builder: usize, package: String },

    /// Unknown builder index
    #[error("No builder with index {builder}")]
    NoSuchBuilder { builder: usize },

    /// Build process could not be spawned
    #[error("Failed to start build of '{package}': {error}")]
    SpawnFailed { package: String, error: String },

    /// Container runtime requested but unavailable
    #[error("Container runtime not available: {runtime}")]
    RuntimeNotAvailable { runtime: String },

    /// Build root preparation failed
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

/// Persistent state errors (fatal for the run)
#[derive(Error, Debug)]
pub enum StoreError {
    /// State file could not be serialized
    #[error("Failed to serialize '{path}': {error}")]
    Serialize { path: PathBuf, error: String },

    /// State file could not be written
    #[error("Failed to persist '{path}': {error}")]
    Persist { path: PathBuf, error: String },

    /// State file exists but is unreadable or malformed
    #[error("Failed to load '{path}': {error}")]
    Load { path: PathBuf, error: String },
}

/// Project configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: PathBuf, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: PathBuf, error: String },

    /// A value is out of range
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Top-level pkgforge error type
#[derive(Error, Debug)]
pub enum PkgforgeError {
    /// Packages directory could not be read
    #[error("Cannot read package registry at '{path}': {error}")]
    Registry { path: PathBuf, error: String },

    /// Resolver error
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Repository error
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Build error
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Store error
    #[error("State error: {0}")]
    Store(#[from] StoreError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// Config error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Run interrupted by the operator
    #[error("Interrupted")]
    Interrupted,
}
