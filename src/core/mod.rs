//! Core business logic module
//!
//! Scheduling and checking engine. Apart from the persistence helpers in
//! [`store`] and [`integrate`], I/O belongs in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`package`] - Recipes, packages and the package registry
//! - [`repository`] - Binary sources and the repository pool
//! - [`oracle`] - Dependency expression evaluation
//! - [`resolver`] - Dependency graph, cycle detection and build order
//! - [`cycle`] - Bounded retry state of dependency cycles
//! - [`check`] - Per-pass status evaluation
//! - [`builder`] - Builder slots and job management
//! - [`integrate`] - Artifact integration and build history
//! - [`status`] - Package status values and result entries
//! - [`store`] - Result store and lastcheck cache
//! - [`engine`] - The control loop
//! - [`config`] - Project configuration

pub mod builder;
pub mod check;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod integrate;
pub mod oracle;
pub mod package;
pub mod repository;
pub mod resolver;
pub mod status;
pub mod store;
