//! Manual corrections
//!
//! A corrections file is `{"corrections": [ {...}, ... ]}`; each entry names
//! its target by `primary_key` and carries the fields to overwrite. An
//! unreadable file is logged and the run continues without corrections.

use harvest_common::db::CorrectionOutcome;
use harvest_common::{Error, KeyedStore, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
struct CorrectionsFile {
    #[serde(default)]
    corrections: Vec<Value>,
}

pub fn read_corrections(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)?;
    let file: CorrectionsFile = serde_json::from_str(&content)
        .map_err(|e| Error::InvalidInput(format!("Corrections {}: {}", path.display(), e)))?;
    Ok(file.corrections)
}

/// Apply the corrections file at `path`; `None` when it could not be read
pub async fn apply_corrections_file(store: &KeyedStore, path: &Path) -> Result<Option<CorrectionOutcome>> {
    let corrections = match read_corrections(path) {
        Ok(corrections) => corrections,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Corrections unavailable, skipping");
            return Ok(None);
        }
    };

    let outcome = store.apply_corrections(&corrections).await?;
    info!(
        applied = outcome.applied,
        rejected = outcome.rejected,
        unmatched = outcome.unmatched,
        "Corrections applied"
    );
    Ok(Some(outcome))
}
