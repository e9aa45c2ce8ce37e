//! Releases and the commit → release index

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Release name for activity newer than every known release boundary
pub const UNRELEASED: &str = "master";

/// Mapping commit id → release name that first included it
pub type ReleaseIndex = HashMap<String, String>;

/// A release and the timestamp it ended at
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    pub release_name: String,
    pub end_date: i64,
}

impl Release {
    pub fn new(release_name: impl Into<String>, end_date: i64) -> Self {
        Self {
            release_name: release_name.into(),
            end_date,
        }
    }
}

/// Ordered release boundaries used to place records by timestamp
#[derive(Debug, Clone, Default)]
pub struct ReleaseBoundaries {
    releases: Vec<Release>,
}

impl ReleaseBoundaries {
    pub fn new(mut releases: Vec<Release>) -> Self {
        releases.sort_by_key(|r| r.end_date);
        Self { releases }
    }

    /// Earliest release ending after `timestamp`, else [`UNRELEASED`]
    pub fn release_for(&self, timestamp: i64) -> String {
        self.releases
            .iter()
            .find(|r| r.end_date > timestamp)
            .map(|r| r.release_name.to_lowercase())
            .unwrap_or_else(|| UNRELEASED.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }
}
