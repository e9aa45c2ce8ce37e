//! Canonical record namespace: merge, read-back, corrections
//!
//! Records are merged in chunks; each chunk is one transaction in which
//! every record does its own read-modify-write against the stored copy.
//! A failed chunk rolls back as a whole and the error surfaces to the
//! caller, which must then leave its cursor alone.

use futures::{pin_mut, Stream, StreamExt};
use serde_json::{Map, Value};
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use super::{retry_on_lock, KeyedStore};
use crate::models::{record_key, Record, RecordKind};
use crate::{Error, Result};

/// Outcome of merging an incoming record into the stored one
#[derive(Debug, Clone, PartialEq)]
pub enum MergeDecision {
    /// Store this record in place of the existing one
    Accept(Record),
    /// Keep the existing record untouched
    Reject,
}

/// Merge policy: `(existing, incoming) -> decision`
pub type MergeFn = fn(Record, Record) -> MergeDecision;

/// Counts from one merge run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub merged: usize,
    pub rejected: usize,
}

impl MergeOutcome {
    pub fn absorb(&mut self, other: MergeOutcome) {
        self.inserted += other.inserted;
        self.merged += other.merged;
        self.rejected += other.rejected;
    }

    pub fn total(&self) -> usize {
        self.inserted + self.merged + self.rejected
    }
}

/// Counts from one corrections batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionOutcome {
    pub applied: usize,
    /// Corrections without a usable `primary_key`
    pub rejected: usize,
    /// Corrections whose key matched no stored record
    pub unmatched: usize,
}

/// Result of applying one correction
enum Patched {
    /// Number of records rewritten
    Records(usize),
    /// The patched record no longer deserializes
    Invalid(String),
}

/// Fields a correction may never overwrite
const PROTECTED_FIELDS: [&str; 2] = ["primary_key", "record_type"];

impl KeyedStore {
    /// Merge a stream of records into the store
    ///
    /// Records absent from the store are inserted unconditionally; present
    /// ones go through `merge`. The first stream error or store failure
    /// stops the run; chunks committed before it stay committed.
    pub async fn merge_records<S, E>(
        &self,
        records: S,
        merge: MergeFn,
        chunk_size: usize,
    ) -> std::result::Result<MergeOutcome, E>
    where
        S: Stream<Item = std::result::Result<Record, E>>,
        E: From<Error>,
    {
        pin_mut!(records);

        let chunk_size = chunk_size.max(1);
        let mut outcome = MergeOutcome::default();
        let mut chunk = Vec::with_capacity(chunk_size);

        while let Some(item) = records.next().await {
            chunk.push(item?);
            if chunk.len() >= chunk_size {
                outcome.absorb(self.merge_chunk(&chunk, merge).await?);
                chunk.clear();
            }
        }

        if !chunk.is_empty() {
            outcome.absorb(self.merge_chunk(&chunk, merge).await?);
        }

        Ok(outcome)
    }

    /// Merge one batch of records atomically
    pub async fn merge_chunk(&self, chunk: &[Record], merge: MergeFn) -> Result<MergeOutcome> {
        let outcome = retry_on_lock("merge records", self.lock_wait_ms, || async move {
            self.merge_chunk_once(chunk, merge).await
        })
        .await?;

        debug!(
            inserted = outcome.inserted,
            merged = outcome.merged,
            rejected = outcome.rejected,
            "Merged record chunk"
        );
        Ok(outcome)
    }

    async fn merge_chunk_once(&self, chunk: &[Record], merge: MergeFn) -> Result<MergeOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = MergeOutcome::default();

        for record in chunk {
            let key = record.record_key();
            let to_write = match load_record(&mut tx, &key).await? {
                None => {
                    outcome.inserted += 1;
                    record.clone()
                }
                Some(existing) => match merge(existing, record.clone()) {
                    MergeDecision::Accept(merged) => {
                        outcome.merged += 1;
                        merged
                    }
                    MergeDecision::Reject => {
                        debug!(record_key = %key, "Merge rejected, stored record kept");
                        outcome.rejected += 1;
                        continue;
                    }
                },
            };
            write_record(&mut tx, &key, &to_write).await?;
        }

        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn get_record(&self, kind: RecordKind, primary_key: &str) -> Result<Option<Record>> {
        let mut conn = self.pool.acquire().await?;
        load_record(&mut conn, &record_key(kind, primary_key)).await
    }

    /// Page through stored records in key order, starting after `after_key`
    pub async fn records_page(&self, after_key: Option<&str>, limit: usize) -> Result<Vec<Record>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT value FROM records WHERE record_key > ? ORDER BY record_key LIMIT ?",
        )
        .bind(after_key.unwrap_or(""))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(value,)| serde_json::from_str(&value).map_err(Error::from))
            .collect()
    }

    /// Overwrite records in place (one transaction)
    pub async fn update_records(&self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        retry_on_lock("update records", self.lock_wait_ms, || async move {
            let mut tx = self.pool.begin().await?;
            for record in records {
                write_record(&mut tx, &record.record_key(), record).await?;
            }
            tx.commit().await?;
            Ok::<(), Error>(())
        })
        .await
    }

    pub async fn count_records(&self, kind: Option<RecordKind>) -> Result<i64> {
        let count = match kind {
            Some(kind) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE record_type = ?")
                    .bind(kind.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM records")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    /// Apply manual corrections to stored records
    ///
    /// Each correction is a JSON object carrying `primary_key`; its other
    /// fields overwrite the matching records' fields. A correction without
    /// a primary key, or one whose values do not fit the record, is logged
    /// and skipped; the rest of the batch proceeds.
    pub async fn apply_corrections(&self, corrections: &[Value]) -> Result<CorrectionOutcome> {
        let mut outcome = CorrectionOutcome::default();

        for correction in corrections {
            let Some((primary_key, patch)) = correction_target(correction) else {
                warn!(correction = %correction, "Correction misses primary key");
                outcome.rejected += 1;
                continue;
            };

            match self.apply_correction(&primary_key, patch).await? {
                Patched::Records(0) => {
                    debug!(primary_key = %primary_key, "Correction matched no record");
                    outcome.unmatched += 1;
                }
                Patched::Records(_) => outcome.applied += 1,
                Patched::Invalid(reason) => {
                    warn!(primary_key = %primary_key, error = %reason, "Correction does not fit the record, skipped");
                    outcome.rejected += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Patch every record with `primary_key`; all of them or none
    async fn apply_correction(&self, primary_key: &str, patch: &Map<String, Value>) -> Result<Patched> {
        retry_on_lock("apply correction", self.lock_wait_ms, || async move {
            let mut tx = self.pool.begin().await?;

            let rows: Vec<(String, String)> =
                sqlx::query_as("SELECT record_key, value FROM records WHERE primary_key = ?")
                    .bind(primary_key)
                    .fetch_all(&mut *tx)
                    .await?;

            let touched = rows.len();
            for (key, value) in rows {
                let mut json: Value = serde_json::from_str(&value)?;
                if let Some(fields) = json.as_object_mut() {
                    for (field, patched) in patch {
                        if !PROTECTED_FIELDS.contains(&field.as_str()) {
                            fields.insert(field.clone(), patched.clone());
                        }
                    }
                }
                let corrected: Record = match serde_json::from_value(json) {
                    Ok(record) => record,
                    // Dropping the transaction rolls back records already patched
                    Err(e) => return Ok(Patched::Invalid(e.to_string())),
                };
                write_record(&mut tx, &key, &corrected).await?;
            }

            tx.commit().await?;
            Ok::<Patched, Error>(Patched::Records(touched))
        })
        .await
    }
}

/// Extract the primary key and patch body of a correction
fn correction_target(correction: &Value) -> Option<(String, &Map<String, Value>)> {
    let patch = correction.as_object()?;
    let primary_key = match patch.get("primary_key")? {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some((primary_key, patch))
}

async fn load_record(conn: &mut SqliteConnection, key: &str) -> Result<Option<Record>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM records WHERE record_key = ?")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some((value,)) => Ok(Some(serde_json::from_str(&value)?)),
        None => Ok(None),
    }
}

async fn write_record(conn: &mut SqliteConnection, key: &str, record: &Record) -> Result<()> {
    let value = serde_json::to_string(record)?;
    sqlx::query(
        "INSERT INTO records (record_key, record_type, primary_key, date, value) VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(record_key) DO UPDATE SET
            record_type = excluded.record_type,
            primary_key = excluded.primary_key,
            date = excluded.date,
            value = excluded.value",
    )
    .bind(key)
    .bind(record.record_type.as_str())
    .bind(&record.primary_key)
    .bind(record.date)
    .bind(value)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
