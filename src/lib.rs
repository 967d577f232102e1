//! Pkgforge - incremental package-build orchestrator
//!
//! Given a directory of package recipes, pkgforge determines a build order
//! under inter-package dependencies, dispatches ready packages to a bounded
//! pool of builders, integrates the produced binaries into a local
//! repository and persists enough state to resume incrementally.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Scheduling engine and its data model
//! - [`registry`] - Remote repository and registry sources
//! - [`infra`] - Infrastructure layer (filesystem, build processes)
//! - [`config`] - Constants and defaults
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;
pub mod registry;

#[cfg(test)]
pub mod test_utils;
