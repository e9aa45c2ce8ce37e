//! Harvest orchestrator
//!
//! Walks every (repository, branch, source kind) tuple and every mail and
//! member list. Each tuple goes through:
//!
//! ```text
//! IDLE → FETCHING → PROCESSING → COMMITTING → IDLE
//! ```
//!
//! The cursor is read before fetching and written only after every record of
//! the batch has been merged. A tuple that fails anywhere is logged and
//! skipped with its cursor untouched; the next run fetches the same range
//! again and the merge policies make the replay harmless.
//!
//! Repositories run concurrently (bounded); the branches and kinds of one
//! repository run sequentially. Cancellation is honoured between tuples only.

use futures::{stream, StreamExt};
use harvest_common::db::MergeOutcome;
use harvest_common::models::{ReleaseIndex, Repo};
use harvest_common::KeyedStore;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cursor::{bug_cursor_key, cursor_key};
use crate::config::HarvestConfig;
use crate::error::{HarvestError, HarvestResult};
use crate::services::driverlog::CiRuleSet;
use crate::services::merge_policy::merge_fn_for;
use crate::services::record_processor::RecordProcessor;
use crate::sources::{MemberWindow, SourceBatch, SourceKind, SourceRegistry, SourceTarget};

/// Phase of a tuple's harvest cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuplePhase {
    Idle,
    Fetching,
    Processing,
    Committing,
}

impl fmt::Display for TuplePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TuplePhase::Idle => "IDLE",
            TuplePhase::Fetching => "FETCHING",
            TuplePhase::Processing => "PROCESSING",
            TuplePhase::Committing => "COMMITTING",
        };
        f.write_str(name)
    }
}

/// Tallies of one harvest stage
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HarvestReport {
    pub tuples_harvested: usize,
    pub tuples_failed: usize,
    /// Tuples not attempted (cancelled, or no connector for the kind)
    pub tuples_skipped: usize,
    pub records: MergeOutcome,
}

impl HarvestReport {
    pub fn absorb(&mut self, other: HarvestReport) {
        self.tuples_harvested += other.tuples_harvested;
        self.tuples_failed += other.tuples_failed;
        self.tuples_skipped += other.tuples_skipped;
        self.records.absorb(other.records);
    }
}

/// One unit of incremental harvesting
struct Tuple<'a> {
    kind: SourceKind,
    target: SourceTarget,
    /// `None` for sources re-read wholesale every run
    cursor_key: Option<String>,
    /// Cursor stored when the connector reports none
    fallback_cursor: Option<String>,
    ci_rules: Option<&'a CiRuleSet>,
}

impl Tuple<'_> {
    fn label(&self) -> String {
        match &self.cursor_key {
            Some(key) => key.clone(),
            None => format!("{}:{}", self.kind, self.target.uri),
        }
    }
}

pub struct HarvestOrchestrator {
    store: KeyedStore,
    processor: Arc<RecordProcessor>,
    sources: SourceRegistry,
    max_parallel_repos: usize,
    merge_chunk_size: usize,
    member_window: MemberWindow,
    cancel: CancellationToken,
}

impl HarvestOrchestrator {
    pub fn new(
        store: KeyedStore,
        processor: Arc<RecordProcessor>,
        sources: SourceRegistry,
        config: &HarvestConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            processor,
            sources,
            max_parallel_repos: config.max_parallel_repos.max(1),
            merge_chunk_size: config.merge_chunk_size.max(1),
            member_window: MemberWindow {
                days_to_update: config.days_to_update_members,
                look_ahead: config.members_look_ahead,
            },
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // ========================================================================
    // Stages
    // ========================================================================

    /// Harvest every repository, up to `max_parallel_repos` at a time
    pub async fn harvest_repos(&self, repos: &[Repo]) -> HarvestReport {
        info!(
            repos = repos.len(),
            parallel = self.max_parallel_repos,
            "Harvesting repositories"
        );

        let reports: Vec<HarvestReport> = stream::iter(repos)
            .map(|repo| self.harvest_repo(repo))
            .buffer_unordered(self.max_parallel_repos)
            .collect()
            .await;

        let mut total = HarvestReport::default();
        for report in reports {
            total.absorb(report);
        }
        total
    }

    /// Blueprints, bugs, then commits and reviews of each branch
    pub async fn harvest_repo(&self, repo: &Repo) -> HarvestReport {
        let mut report = HarvestReport::default();
        let ci_rules = CiRuleSet::compile(&repo.ci);
        let run_started = harvest_common::time::now_timestamp().to_string();

        info!(uri = %repo.uri, module = %repo.module, "Processing repo");

        self.run_tuple(
            &mut report,
            Tuple {
                kind: SourceKind::Blueprints,
                target: SourceTarget::repo(repo),
                cursor_key: None,
                fallback_cursor: None,
                ci_rules: None,
            },
        )
        .await;

        self.run_tuple(
            &mut report,
            Tuple {
                kind: SourceKind::Bugs,
                target: SourceTarget::repo(repo),
                cursor_key: Some(bug_cursor_key(&repo.module)),
                fallback_cursor: Some(run_started),
                ci_rules: None,
            },
        )
        .await;

        for branch in repo.branches() {
            self.run_tuple(
                &mut report,
                Tuple {
                    kind: SourceKind::Commits,
                    target: SourceTarget::repo_branch(repo, &branch),
                    cursor_key: Some(cursor_key(SourceKind::Commits, &repo.uri, Some(&branch))),
                    fallback_cursor: None,
                    ci_rules: None,
                },
            )
            .await;

            self.run_tuple(
                &mut report,
                Tuple {
                    kind: SourceKind::Reviews,
                    target: SourceTarget::repo_branch(repo, &branch),
                    cursor_key: Some(cursor_key(SourceKind::Reviews, &repo.uri, Some(&branch))),
                    fallback_cursor: None,
                    ci_rules: (!ci_rules.is_empty()).then_some(&ci_rules),
                },
            )
            .await;
        }

        report
    }

    pub async fn harvest_mail_lists(&self, lists: &[String]) -> HarvestReport {
        let mut report = HarvestReport::default();
        for list in lists {
            info!(list = %list, "Processing mailing list");
            self.run_tuple(
                &mut report,
                Tuple {
                    kind: SourceKind::Mail,
                    target: SourceTarget::list(list),
                    cursor_key: Some(cursor_key(SourceKind::Mail, list, None)),
                    fallback_cursor: None,
                    ci_rules: None,
                },
            )
            .await;
        }
        report
    }

    pub async fn harvest_member_lists(&self, lists: &[String]) -> HarvestReport {
        let mut report = HarvestReport::default();
        for list in lists {
            info!(
                list = %list,
                days_to_update = self.member_window.days_to_update,
                look_ahead = self.member_window.look_ahead,
                "Processing member list"
            );
            let target = SourceTarget {
                member_window: Some(self.member_window),
                ..SourceTarget::list(list)
            };
            self.run_tuple(
                &mut report,
                Tuple {
                    kind: SourceKind::Members,
                    target,
                    cursor_key: Some(cursor_key(SourceKind::Members, list, None)),
                    fallback_cursor: None,
                    ci_rules: None,
                },
            )
            .await;
        }
        report
    }

    /// Union of every repo's commit → release map
    pub async fn build_release_index(&self, repos: &[Repo]) -> ReleaseIndex {
        let mut index = ReleaseIndex::new();
        let Some(connector) = self.sources.get(SourceKind::Commits) else {
            return index;
        };

        for repo in repos {
            match connector.release_index(repo).await {
                Ok(repo_index) => {
                    debug!(module = %repo.module, commits = repo_index.len(), "Loaded release tags");
                    index.extend(repo_index);
                }
                Err(e) => warn!(module = %repo.module, error = %e, "Release tags unavailable"),
            }
        }

        info!(commits = index.len(), "Release index built");
        index
    }

    // ========================================================================
    // Tuple cycle
    // ========================================================================

    async fn run_tuple(&self, report: &mut HarvestReport, tuple: Tuple<'_>) {
        let label = tuple.label();

        if self.cancel.is_cancelled() {
            debug!(tuple = %label, "Cancelled, tuple not started");
            report.tuples_skipped += 1;
            return;
        }

        match self.harvest_tuple(tuple).await {
            Ok(outcome) => {
                report.tuples_harvested += 1;
                report.records.absorb(outcome);
            }
            Err(HarvestError::NoConnector(kind)) => {
                debug!(tuple = %label, kind = %kind, "No connector, tuple skipped");
                report.tuples_skipped += 1;
            }
            Err(e) => {
                warn!(tuple = %label, error = %e, "Tuple failed, cursor left unchanged");
                report.tuples_failed += 1;
            }
        }
    }

    async fn harvest_tuple(&self, tuple: Tuple<'_>) -> HarvestResult<MergeOutcome> {
        let label = tuple.label();
        let connector = self
            .sources
            .get(tuple.kind)
            .ok_or_else(|| HarvestError::NoConnector(tuple.kind.to_string()))?;

        debug!(tuple = %label, phase = %TuplePhase::Fetching, "Tuple phase");
        let cursor: Option<String> = match &tuple.cursor_key {
            Some(key) => self.store.get_by_key(key).await?,
            None => None,
        };
        let SourceBatch {
            records,
            cursor: new_cursor,
        } = connector.fetch(&tuple.target, cursor.as_deref()).await?;

        // Processing is pulled by the merge, one chunk at a time
        debug!(tuple = %label, phase = %TuplePhase::Processing, "Tuple phase");
        let kind = tuple.kind.record_kind();
        let canonical = self.processor.process(kind, records, tuple.ci_rules);
        let outcome = self
            .store
            .merge_records(canonical, merge_fn_for(kind), self.merge_chunk_size)
            .await?;

        debug!(tuple = %label, phase = %TuplePhase::Committing, "Tuple phase");
        if let (Some(key), Some(position)) = (&tuple.cursor_key, new_cursor.or(tuple.fallback_cursor)) {
            if cursor.as_deref() != Some(position.as_str()) {
                self.store.set_by_key(key, &position).await?;
            }
        }

        info!(
            tuple = %label,
            inserted = outcome.inserted,
            merged = outcome.merged,
            rejected = outcome.rejected,
            "Tuple harvested"
        );
        debug!(tuple = %label, phase = %TuplePhase::Idle, "Tuple phase");
        Ok(outcome)
    }
}
