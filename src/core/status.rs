//! Package status model
//!
//! Every package has exactly one [`PackageStatus`] per pass. The serialized
//! names are the stable reporting contract of the Result Store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a package within one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    /// Ready to build, waiting for assignment
    Scheduled,
    /// A builder is running a job for the package
    Building,
    /// Dependencies not ready or no free builder
    Blocked,
    /// Built successfully (this run or an unchanged earlier run)
    Succeeded,
    /// Job exited non-zero or left a failure marker
    Failed,
    /// Recipe could not be parsed
    Broken,
    /// Excluded by recipe directive or architecture
    Excluded,
    /// Disabled by recipe directive
    Disabled,
    /// Locked by recipe directive; existing binaries are kept
    Locked,
    /// Dependency expansion failed
    Unresolvable,
}

impl PackageStatus {
    /// All statuses, in reporting order
    pub const ALL: [PackageStatus; 10] = [
        Self::Scheduled,
        Self::Building,
        Self::Blocked,
        Self::Succeeded,
        Self::Failed,
        Self::Broken,
        Self::Excluded,
        Self::Disabled,
        Self::Locked,
        Self::Unresolvable,
    ];

    /// Status name as written to the Result Store
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Building => "building",
            Self::Blocked => "blocked",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Broken => "broken",
            Self::Excluded => "excluded",
            Self::Disabled => "disabled",
            Self::Locked => "locked",
            Self::Unresolvable => "unresolvable",
        }
    }

    /// Whether dependents must wait for this package
    ///
    /// Packages that are going to produce new binaries in this run are not
    /// ready yet.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Scheduled | Self::Building | Self::Blocked)
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status together with its optional detail string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// The status
    pub status: PackageStatus,

    /// Human-readable detail (reason, builder, error message)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl StatusEntry {
    /// Status without detail
    pub fn new(status: PackageStatus) -> Self {
        Self {
            status,
            details: None,
        }
    }

    /// Status with a detail string
    pub fn with_details(status: PackageStatus, details: impl Into<String>) -> Self {
        Self {
            status,
            details: Some(details.into()),
        }
    }
}

impl fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {details}", self.status),
            None => write!(f, "{}", self.status),
        }
    }
}
