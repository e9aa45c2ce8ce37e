//! One complete harvest run
//!
//! Stages, in order:
//! 1. run guard (refuse to overlap another live run)
//! 2. bootstrap: driverlog, default data, project list (fatal on failure)
//! 3. repositories, then mailing lists
//! 4. release post-processing
//! 5. corrections
//! 6. member lists
//! 7. `runtime_storage_update_time`
//!
//! Cancellation stops the run between tuples; later stages are skipped and
//! the update time is not written.

use harvest_common::db::CorrectionOutcome;
use harvest_common::models::{Release, ReleaseBoundaries, Repo};
use harvest_common::time::now_timestamp;
use harvest_common::KeyedStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::HarvestConfig;
use crate::corrections::apply_corrections_file;
use crate::default_data::{
    load_default_data, store_default_data, MAIL_LISTS_KEY, MEMBER_LISTS_KEY, RELEASES_KEY, REPOS_KEY,
};
use crate::error::HarvestResult;
use crate::harvest::{HarvestOrchestrator, HarvestReport, RunGuard};
use crate::project_list::{load_project_list, update_module_groups};
use crate::services::attribution::AttributionResolver;
use crate::services::driverlog::DriverLog;
use crate::services::identity_directory::IdentityDirectory;
use crate::services::record_processor::RecordProcessor;
use crate::sources::SourceRegistry;

pub const UPDATE_TIME_KEY: &str = "runtime_storage_update_time";

/// What a run did
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub repos: HarvestReport,
    pub mail_lists: HarvestReport,
    pub members: HarvestReport,
    pub releases_stamped: usize,
    pub corrections: Option<CorrectionOutcome>,
    pub cancelled: bool,
}

pub struct HarvestRun {
    store: KeyedStore,
    config: HarvestConfig,
    sources: SourceRegistry,
    directory: Arc<dyn IdentityDirectory>,
    cancel: CancellationToken,
}

impl HarvestRun {
    pub fn new(
        store: KeyedStore,
        config: HarvestConfig,
        sources: SourceRegistry,
        directory: Arc<dyn IdentityDirectory>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            config,
            sources,
            directory,
            cancel,
        }
    }

    /// Execute the run under the run guard
    pub async fn execute(self) -> HarvestResult<RunSummary> {
        let guard = RunGuard::acquire(&self.store).await?;

        let result = self.run_stages().await;

        if let Err(e) = guard.release().await {
            warn!(error = %e, "Failed to release run guard");
        }
        result
    }

    async fn bootstrap(&self) -> HarvestResult<()> {
        let ci_rules = match &self.config.driverlog {
            Some(path) => DriverLog::load(path)?.rules_by_module(),
            None => HashMap::new(),
        };

        let data = load_default_data(&self.config.default_data)?;
        store_default_data(&self.store, &data, &ci_rules).await?;

        let mut groups = data.module_groups.clone();
        if let Some(path) = &self.config.project_list {
            groups.extend(load_project_list(path)?.module_groups());
        }
        update_module_groups(&self.store, &data.repos, groups).await?;

        Ok(())
    }

    async fn run_stages(&self) -> HarvestResult<RunSummary> {
        let mut summary = RunSummary::default();

        self.bootstrap().await?;

        let repos: Vec<Repo> = self.store.get_by_key(REPOS_KEY).await?.unwrap_or_default();
        let mail_lists: Vec<String> = self.store.get_by_key(MAIL_LISTS_KEY).await?.unwrap_or_default();
        let member_lists: Vec<String> = self.store.get_by_key(MEMBER_LISTS_KEY).await?.unwrap_or_default();

        let resolver = AttributionResolver::new(
            self.store.clone(),
            self.directory.clone(),
            self.config.directory_timeout,
        )
        .await?;
        let processor = Arc::new(RecordProcessor::new(resolver));
        let orchestrator = HarvestOrchestrator::new(
            self.store.clone(),
            processor.clone(),
            self.sources.clone(),
            &self.config,
            self.cancel.clone(),
        );

        summary.repos = orchestrator.harvest_repos(&repos).await;
        summary.mail_lists = orchestrator.harvest_mail_lists(&mail_lists).await;
        if orchestrator.is_cancelled() {
            warn!("Run cancelled, skipping post-processing");
            summary.cancelled = true;
            return Ok(summary);
        }

        let release_index = orchestrator.build_release_index(&repos).await;
        let releases: Vec<Release> = self.store.get_by_key(RELEASES_KEY).await?.unwrap_or_default();
        summary.releases_stamped = processor
            .post_process(&self.store, &release_index, &ReleaseBoundaries::new(releases))
            .await?;

        if let Some(path) = &self.config.corrections {
            summary.corrections = apply_corrections_file(&self.store, path).await?;
        }

        summary.members = orchestrator.harvest_member_lists(&member_lists).await;
        if orchestrator.is_cancelled() {
            warn!("Run cancelled during member harvesting");
            summary.cancelled = true;
            return Ok(summary);
        }

        self.store.set_by_key(UPDATE_TIME_KEY, &now_timestamp()).await?;

        info!(
            tuples_harvested = summary.repos.tuples_harvested
                + summary.mail_lists.tuples_harvested
                + summary.members.tuples_harvested,
            tuples_failed = summary.repos.tuples_failed
                + summary.mail_lists.tuples_failed
                + summary.members.tuples_failed,
            releases_stamped = summary.releases_stamped,
            "Harvest run complete"
        );
        Ok(summary)
    }
}
