//! In-memory source connectors for tests

use async_trait::async_trait;
use futures::stream;
use harvest_common::models::RawRecord;
use harvest_processor::sources::{SourceBatch, SourceConnector, SourceError, SourceKind, SourceTarget};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serves the same records on every fetch and reports no cursor
pub struct StaticSource {
    kind: SourceKind,
    records: Vec<RawRecord>,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new(kind: SourceKind, records: Vec<RawRecord>) -> Self {
        Self {
            kind,
            records,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceConnector for StaticSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, _target: &SourceTarget, _cursor: Option<&str>) -> Result<SourceBatch, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let records: Vec<Result<RawRecord, SourceError>> = self.records.iter().cloned().map(Ok).collect();
        Ok(SourceBatch {
            records: Box::pin(stream::iter(records)),
            cursor: None,
        })
    }
}

/// Connector whose upstream is always down
pub struct FailingSource {
    kind: SourceKind,
}

impl FailingSource {
    pub fn new(kind: SourceKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl SourceConnector for FailingSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, target: &SourceTarget, _cursor: Option<&str>) -> Result<SourceBatch, SourceError> {
        Err(SourceError::Unavailable(format!("{} is down", target.uri)))
    }
}
