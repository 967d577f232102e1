//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    use crate::core::status::{PackageStatus, StatusEntry};

    /// Generate a package id (lowercase alphanumeric with hyphens)
    pub fn package_id() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,12}[a-z0-9]?"
    }

    /// Generate a version string with one to three numeric components
    pub fn version() -> impl Strategy<Value = String> {
        prop::collection::vec(0u32..50, 1..=3).prop_map(|parts| {
            parts
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(".")
        })
    }

    /// Generate a well-formed fingerprint (128 hex characters)
    pub fn fingerprint() -> impl Strategy<Value = String> {
        "[0-9a-f]{128}"
    }

    /// Generate any package status
    pub fn status() -> impl Strategy<Value = PackageStatus> {
        prop::sample::select(PackageStatus::ALL.to_vec())
    }

    /// Generate a status entry with optional printable details
    pub fn status_entry() -> impl Strategy<Value = StatusEntry> {
        (status(), prop::option::of("[ -~]{0,20}"))
            .prop_map(|(status, details)| StatusEntry { status, details })
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::core::oracle::parse_version;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_package_id_generator(id in package_id()) {
            prop_assert!(!id.is_empty());
            prop_assert!(!id.starts_with(['.', '_']));
        }

        #[test]
        fn test_versions_are_semver_after_padding(version in version()) {
            prop_assert!(parse_version(&version).is_some());
        }

        #[test]
        fn test_fingerprint_generator(fp in fingerprint()) {
            prop_assert_eq!(fp.len(), 128);
            prop_assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
