//! Error types for harvest-processor
//!
//! Tuple-level errors (`Source`, `Store` while merging) are logged and the
//! tuple is skipped; only startup errors abort a run.

use thiserror::Error;

use crate::sources::SourceError;

/// Harvest error type
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Keyed store failure
    #[error("Store error: {0}")]
    Store(#[from] harvest_common::Error),

    /// Source connector failure
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// No connector registered for a source kind
    #[error("No connector configured for {0}")]
    NoConnector(String),
}

/// Result type for harvest operations
pub type HarvestResult<T> = Result<T, HarvestError>;
