//! Per-kind merge policies
//!
//! Applied by the store only when a record with the same key already exists.

use harvest_common::db::{MergeDecision, MergeFn};
use harvest_common::models::{Record, RecordKind};

/// Incoming record fully supersedes the stored one
pub fn replace_record(_existing: Record, incoming: Record) -> MergeDecision {
    MergeDecision::Accept(incoming)
}

/// Branch coverage of a commit never shrinks
///
/// An incoming branch set that is a strict subset of the stored one comes
/// from a stale re-harvest and is rejected. Anything else widens the stored
/// record's branch set to the union.
pub fn merge_commits(mut existing: Record, incoming: Record) -> MergeDecision {
    let strict_subset =
        incoming.branches.len() < existing.branches.len() && incoming.branches.is_subset(&existing.branches);
    if strict_subset {
        return MergeDecision::Reject;
    }

    existing.branches.extend(incoming.branches);
    MergeDecision::Accept(existing)
}

/// Merge policy used for records of `kind`
pub fn merge_fn_for(kind: RecordKind) -> MergeFn {
    match kind {
        RecordKind::Commit => merge_commits,
        _ => replace_record,
    }
}
