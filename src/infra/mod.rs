//! Infrastructure layer
//!
//! Handles filesystem access, cache directories and external build
//! processes.

pub mod dirs;
pub mod executor;
pub mod filesystem;
pub mod sandbox;
