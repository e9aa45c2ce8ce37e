//! Resolved run configuration
//!
//! Turns the TOML file plus root folder into one explicit value handed to
//! the pipeline at construction. Nothing below reads the environment or the
//! config file again.

use harvest_common::config::TomlConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a harvest run needs to know, with paths made absolute
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestConfig {
    pub root_folder: PathBuf,
    pub store_path: PathBuf,
    pub lock_wait_ms: u64,
    pub sources_root: PathBuf,
    pub default_data: PathBuf,
    pub driverlog: Option<PathBuf>,
    pub project_list: Option<PathBuf>,
    pub corrections: Option<PathBuf>,
    pub directory_enabled: bool,
    pub directory_url: String,
    pub directory_timeout: Duration,
    pub directory_min_interval_ms: u64,
    pub max_parallel_repos: usize,
    pub merge_chunk_size: usize,
    pub days_to_update_members: u32,
    pub members_look_ahead: u32,
}

impl HarvestConfig {
    pub fn from_toml(config: &TomlConfig, root_folder: &Path) -> Self {
        let resolve = |path: &Path| TomlConfig::resolve_path(root_folder, path);

        Self {
            root_folder: root_folder.to_path_buf(),
            store_path: resolve(&config.store.path),
            lock_wait_ms: config.store.lock_wait_ms,
            sources_root: resolve(&config.sources.root),
            default_data: resolve(&config.sources.default_data),
            driverlog: config.sources.driverlog.as_deref().map(resolve),
            project_list: config.sources.project_list.as_deref().map(resolve),
            corrections: config.sources.corrections.as_deref().map(resolve),
            directory_enabled: config.directory.enabled,
            directory_url: config.directory.base_url.clone(),
            directory_timeout: Duration::from_millis(config.directory.timeout_ms),
            directory_min_interval_ms: config.directory.min_interval_ms,
            max_parallel_repos: config.harvest.max_parallel_repos.max(1),
            merge_chunk_size: config.harvest.merge_chunk_size.max(1),
            days_to_update_members: config.harvest.days_to_update_members,
            members_look_ahead: config.harvest.members_look_ahead,
        }
    }
}
