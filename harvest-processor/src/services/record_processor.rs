//! Record processor
//!
//! Turns a lazy stream of raw records of one kind into a lazy stream of
//! canonical records: stamps the kind, attributes authored records, and
//! emits derived `ci_vote` records after each review. Nothing is buffered;
//! the only suspension points are the source stream and the resolver.
//!
//! Also owns the post-processing pass that stamps releases onto stored
//! records once every source has been drained.

use async_stream::stream;
use futures::Stream;
use harvest_common::models::{RawRecord, Record, RecordKind, ReleaseBoundaries, ReleaseIndex};
use harvest_common::{KeyedStore, Result};
use tracing::{debug, info};

use super::attribution::AttributionResolver;
use super::driverlog::CiRuleSet;
use crate::error::HarvestError;
use crate::sources::SourceError;

/// Stored records read per post-processing page
const POST_PROCESS_PAGE: usize = 500;

pub struct RecordProcessor {
    resolver: AttributionResolver,
}

impl RecordProcessor {
    pub fn new(resolver: AttributionResolver) -> Self {
        Self { resolver }
    }

    /// Normalize and attribute a stream of raw records of `kind`
    ///
    /// For reviews, `ci_rules` (when given) derive `ci_vote` records that
    /// follow each review in the output.
    pub fn process<'a, S>(
        &'a self,
        kind: RecordKind,
        raw: S,
        ci_rules: Option<&'a CiRuleSet>,
    ) -> impl Stream<Item = std::result::Result<Record, HarvestError>> + Send + 'a
    where
        S: Stream<Item = std::result::Result<RawRecord, SourceError>> + Send + 'a,
    {
        stream! {
            for await item in raw {
                let raw = match item {
                    Ok(raw) => raw,
                    Err(e) => {
                        yield Err(HarvestError::from(e));
                        return;
                    }
                };

                let mut record = Record::from_raw(kind, raw);
                if kind.has_author() {
                    if let Err(e) = self.attribute(&mut record).await {
                        yield Err(HarvestError::from(e));
                        return;
                    }
                }

                let votes = match (kind, ci_rules) {
                    (RecordKind::Review, Some(rules)) => rules.derive_votes(&record),
                    _ => Vec::new(),
                };

                yield Ok(record);
                for vote in votes {
                    yield Ok(vote);
                }
            }
        }
    }

    async fn attribute(&self, record: &mut Record) -> Result<()> {
        let email = record.author_email.clone().unwrap_or_default();
        let name = record.author_name.clone().unwrap_or_default();

        let attribution = self.resolver.resolve(&email, &name, record.date).await?;

        record.user_id = attribution.user_id;
        record.person_id = attribution.person_id;
        record.company_name = Some(attribution.company_name);
        Ok(())
    }

    /// Stamp releases onto every stored record
    ///
    /// Commits take their release from `release_index`; a commit the index
    /// does not know, and any other record without a release, is placed by
    /// timestamp against `boundaries`. Records already carrying a release are
    /// left alone unless the index says otherwise, so a second pass with the
    /// same inputs changes nothing. Returns the number of records updated.
    pub async fn post_process(
        &self,
        store: &KeyedStore,
        release_index: &ReleaseIndex,
        boundaries: &ReleaseBoundaries,
    ) -> Result<usize> {
        let mut updated = 0;
        let mut after: Option<String> = None;

        loop {
            let page = store.records_page(after.as_deref(), POST_PROCESS_PAGE).await?;
            let Some(last) = page.last() else { break };
            after = Some(last.record_key());

            let changed: Vec<Record> = page
                .into_iter()
                .filter_map(|mut record| {
                    let release = release_for(&record, release_index, boundaries)?;
                    record.release = Some(release);
                    Some(record)
                })
                .collect();

            if !changed.is_empty() {
                store.update_records(&changed).await?;
                updated += changed.len();
                debug!(count = changed.len(), "Stamped releases on page");
            }
        }

        info!(updated, "Release post-processing complete");
        Ok(updated)
    }
}

/// New release for `record`, `None` when it should stay as stored
fn release_for(record: &Record, index: &ReleaseIndex, boundaries: &ReleaseBoundaries) -> Option<String> {
    let wanted = match record.record_type {
        RecordKind::Commit => match index.get(&record.primary_key) {
            Some(release) => release.to_lowercase(),
            None if record.release.is_some() => return None,
            None => boundaries.release_for(record.date),
        },
        _ if record.release.is_some() => return None,
        _ => boundaries.release_for(record.date),
    };

    (record.release.as_deref() != Some(wanted.as_str())).then_some(wanted)
}
