//! Keyed store backed by SQLite
//!
//! One store serves two roles: a scalar key/value map (cursors, indices,
//! flags) and the bulk record namespace that harvested activity is merged
//! into. People and companies live in their own namespaces.
//!
//! The unit of atomicity is a single transaction around a per-key
//! read-modify-write; no lock outlives one merge chunk.

pub mod init;
pub mod kv;
pub mod people;
pub mod records;
pub mod retry;

pub use init::{init_database, init_memory_database};
pub use records::{CorrectionOutcome, MergeDecision, MergeFn, MergeOutcome};
pub use retry::retry_on_lock;

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Default upper bound on retrying a locked database
pub const DEFAULT_LOCK_WAIT_MS: u64 = 5000;

/// Durable keyed store shared by every harvest component
#[derive(Clone)]
pub struct KeyedStore {
    pool: SqlitePool,
    lock_wait_ms: u64,
}

impl KeyedStore {
    /// Open (or create) the store file at `path`
    pub async fn open(path: &Path, lock_wait_ms: u64) -> Result<Self> {
        let pool = init_database(path).await?;
        Ok(Self { pool, lock_wait_ms })
    }

    /// Throwaway in-memory store
    pub async fn in_memory() -> Result<Self> {
        let pool = init_memory_database().await?;
        Ok(Self {
            pool,
            lock_wait_ms: DEFAULT_LOCK_WAIT_MS,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn lock_wait_ms(&self) -> u64 {
        self.lock_wait_ms
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
