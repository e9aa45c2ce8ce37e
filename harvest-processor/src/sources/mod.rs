//! Source connectors
//!
//! Each upstream system (VCS, review server, bug tracker, mailing list,
//! member list) is reached through one [`SourceConnector`]. The orchestrator
//! only sees the uniform fetch contract; which implementation serves a kind
//! is decided by configuration when the [`SourceRegistry`] is built.

pub mod file_source;

pub use file_source::FileSource;

use async_trait::async_trait;
use futures::stream::BoxStream;
use harvest_common::models::{RawRecord, RecordKind, ReleaseIndex, Repo};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Connector errors; a failing tuple is skipped until the next run
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Source timed out: {0}")]
    Timeout(String),

    #[error("Malformed source data: {0}")]
    Malformed(String),
}

/// Capability a connector provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Commits,
    Reviews,
    Bugs,
    Blueprints,
    Mail,
    Members,
}

impl SourceKind {
    pub const ALL: [SourceKind; 6] = [
        SourceKind::Commits,
        SourceKind::Reviews,
        SourceKind::Bugs,
        SourceKind::Blueprints,
        SourceKind::Mail,
        SourceKind::Members,
    ];

    /// Kind of the records this source yields
    pub fn record_kind(&self) -> RecordKind {
        match self {
            SourceKind::Commits => RecordKind::Commit,
            SourceKind::Reviews => RecordKind::Review,
            SourceKind::Bugs => RecordKind::Bug,
            SourceKind::Blueprints => RecordKind::Blueprint,
            SourceKind::Mail => RecordKind::Email,
            SourceKind::Members => RecordKind::Member,
        }
    }

    /// Prefix of this source's cursor keys
    pub fn cursor_prefix(&self) -> &'static str {
        match self {
            SourceKind::Commits => "vcs",
            SourceKind::Reviews => "rcs",
            SourceKind::Bugs => "bug",
            SourceKind::Blueprints => "bp",
            SourceKind::Mail => "email",
            SourceKind::Members => "member",
        }
    }

    /// Directory name used by file-backed connectors
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Commits => "commits",
            SourceKind::Reviews => "reviews",
            SourceKind::Bugs => "bugs",
            SourceKind::Blueprints => "blueprints",
            SourceKind::Mail => "mail",
            SourceKind::Members => "members",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far member harvesting looks beyond its cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberWindow {
    /// Re-read members first seen within this many days
    pub days_to_update: u32,
    /// Probe this many ids past the last known member
    pub look_ahead: u32,
}

/// What to fetch: a repository (optionally one branch of it) or a list
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTarget {
    /// Repository uri or list address
    pub uri: String,
    pub module: Option<String>,
    pub branch: Option<String>,
    pub member_window: Option<MemberWindow>,
}

impl SourceTarget {
    pub fn repo(repo: &Repo) -> Self {
        Self {
            uri: repo.uri.clone(),
            module: Some(repo.module.clone()),
            branch: None,
            member_window: None,
        }
    }

    pub fn repo_branch(repo: &Repo, branch: &str) -> Self {
        Self {
            branch: Some(branch.to_string()),
            ..Self::repo(repo)
        }
    }

    pub fn list(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            module: None,
            branch: None,
            member_window: None,
        }
    }
}

/// Lazy record stream plus the position it leads up to
pub struct SourceBatch {
    pub records: BoxStream<'static, Result<RawRecord, SourceError>>,
    /// Position to persist once every record of the batch is merged;
    /// `None` when the connector tracks no position
    pub cursor: Option<String>,
}

impl SourceBatch {
    pub fn empty(cursor: Option<String>) -> Self {
        Self {
            records: Box::pin(futures::stream::empty()),
            cursor,
        }
    }
}

/// Uniform fetch contract of every source
///
/// `fetch` must be safely re-callable with the same cursor: a failed run
/// retries from that point on the next invocation.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch(&self, target: &SourceTarget, cursor: Option<&str>) -> Result<SourceBatch, SourceError>;

    /// Commit id → release name derived from the repo's tags
    async fn release_index(&self, _repo: &Repo) -> Result<ReleaseIndex, SourceError> {
        Ok(ReleaseIndex::new())
    }
}

/// Connectors available to a run, one per source kind
#[derive(Clone, Default)]
pub struct SourceRegistry {
    connectors: HashMap<SourceKind, Arc<dyn SourceConnector>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector under the kind it reports
    pub fn register(&mut self, connector: Arc<dyn SourceConnector>) -> &mut Self {
        self.connectors.insert(connector.kind(), connector);
        self
    }

    /// File-backed connectors for every kind, rooted at `root`
    pub fn file_backed(root: &std::path::Path) -> Self {
        let mut registry = Self::new();
        for kind in SourceKind::ALL {
            registry.register(Arc::new(FileSource::new(root, kind)));
        }
        registry
    }

    pub fn get(&self, kind: SourceKind) -> Option<&Arc<dyn SourceConnector>> {
        self.connectors.get(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_prefixes_are_distinct() {
        let mut prefixes: Vec<_> = SourceKind::ALL.iter().map(|k| k.cursor_prefix()).collect();
        prefixes.sort();
        prefixes.dedup();
        assert_eq!(prefixes.len(), SourceKind::ALL.len());
    }

    #[test]
    fn test_file_backed_registry_covers_every_kind() {
        let registry = SourceRegistry::file_backed(std::path::Path::new("/tmp/sources"));
        for kind in SourceKind::ALL {
            assert_eq!(registry.get(kind).map(|c| c.kind()), Some(kind));
        }
    }
}
