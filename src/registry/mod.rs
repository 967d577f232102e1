//! Remote repository and container registry sources
//!
//! Fetches binary indexes from configured sources and caches snapshots of
//! them locally.

pub mod cache;
pub mod client;

pub use cache::SnapshotCache;
pub use client::RepositoryClient;
