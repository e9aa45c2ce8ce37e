//! Raw and canonical activity records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::Error;

/// Kind tag of a harvested activity item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Commit,
    Review,
    Bug,
    Blueprint,
    Email,
    Member,
    CiVote,
}

impl RecordKind {
    pub const ALL: [RecordKind; 7] = [
        RecordKind::Commit,
        RecordKind::Review,
        RecordKind::Bug,
        RecordKind::Blueprint,
        RecordKind::Email,
        RecordKind::Member,
        RecordKind::CiVote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Commit => "commit",
            RecordKind::Review => "review",
            RecordKind::Bug => "bug",
            RecordKind::Blueprint => "blueprint",
            RecordKind::Email => "email",
            RecordKind::Member => "member",
            RecordKind::CiVote => "ci_vote",
        }
    }

    /// Kinds whose records are attributed to an author
    pub fn has_author(&self) -> bool {
        matches!(
            self,
            RecordKind::Commit
                | RecordKind::Review
                | RecordKind::Bug
                | RecordKind::Blueprint
                | RecordKind::Email
        )
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown record kind: {}", s)))
    }
}

/// One harvested item as produced by a source connector
///
/// The kind tag travels with the batch the record belongs to; the record
/// processor stamps it when building the canonical record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawRecord {
    /// Source-defined identity (commit hash, review number, message id, ...)
    pub id: String,
    /// Unix seconds
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    /// Branches containing a commit
    #[serde(default)]
    pub branches: BTreeSet<String>,
    #[serde(default)]
    pub release: Option<String>,
    /// Remaining free-form fields (message, title, comments, ...)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Normalized, attributed, merge-ready record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub record_type: RecordKind,
    /// Identity within the kind; together with the kind forms the store key
    pub primary_key: String,
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    /// Stored person the record is attributed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Canonical id from the identity directory, if the person has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub branches: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// `Record` fields a raw record's free-form fields may not shadow
const RESERVED_FIELDS: [&str; 5] = ["record_type", "primary_key", "user_id", "person_id", "company_name"];

impl Record {
    /// Build an unattributed canonical record from a raw one
    ///
    /// Free-form fields named like a canonical field are dropped; the
    /// canonical value is set by the processor.
    pub fn from_raw(kind: RecordKind, mut raw: RawRecord) -> Self {
        for name in RESERVED_FIELDS {
            if raw.fields.remove(name).is_some() {
                debug!(id = %raw.id, field = name, "Dropped reserved field from raw record");
            }
        }

        Self {
            record_type: kind,
            primary_key: raw.id,
            date: raw.date,
            author_email: raw.author_email,
            author_name: raw.author_name,
            user_id: None,
            person_id: None,
            company_name: None,
            module: raw.module,
            branch: raw.branch,
            branches: raw.branches,
            release: raw.release,
            fields: raw.fields,
        }
    }

    /// Store key `<kind>:<identity>`
    pub fn record_key(&self) -> String {
        record_key(self.record_type, &self.primary_key)
    }
}

/// Store key for a record of `kind` with identity `primary_key`
pub fn record_key(kind: RecordKind, primary_key: &str) -> String {
    format!("{}:{}", kind.as_str(), primary_key)
}
