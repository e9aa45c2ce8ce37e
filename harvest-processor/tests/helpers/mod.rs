//! Test Helper Utilities
//!
//! Shared fixtures for harvest-processor integration tests

#![allow(dead_code)]

pub mod sources;

use async_trait::async_trait;
use harvest_common::models::{Company, RawRecord, Repo};
use harvest_common::config::TomlConfig;
use harvest_common::KeyedStore;
use harvest_processor::HarvestConfig;
use harvest_processor::services::{AttributionResolver, DirectoryProfile, IdentityDirectory, RecordProcessor};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use sources::{FailingSource, StaticSource};

/// Identity directory answering from a fixed table and counting calls
#[derive(Default)]
pub struct MockDirectory {
    profiles: HashMap<String, DirectoryProfile>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, email: &str, canonical_id: &str, display_name: &str) -> Self {
        self.profiles.insert(
            email.to_lowercase(),
            DirectoryProfile {
                canonical_id: canonical_id.to_string(),
                display_name: display_name.to_string(),
            },
        );
        self
    }

    /// Sleep this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityDirectory for MockDirectory {
    async fn lookup(&self, email: &str) -> Option<DirectoryProfile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.profiles.get(email).cloned()
    }
}

/// Setup in-memory store seeded with the NEC company
pub async fn setup_store() -> KeyedStore {
    let store = KeyedStore::in_memory().await.unwrap();
    store
        .store_company(&Company::new("NEC", ["nec.com", "nec.co.jp"]))
        .await
        .unwrap();
    store
}

pub async fn make_processor(store: &KeyedStore, directory: Arc<dyn IdentityDirectory>) -> Arc<RecordProcessor> {
    let resolver = AttributionResolver::new(store.clone(), directory, Duration::from_secs(1))
        .await
        .unwrap();
    Arc::new(RecordProcessor::new(resolver))
}

/// Defaults resolved against `root`, merging `chunk_size` records per transaction
pub fn test_config(root: &Path, chunk_size: usize) -> HarvestConfig {
    let mut config = HarvestConfig::from_toml(&TomlConfig::default(), root);
    config.merge_chunk_size = chunk_size;
    config.directory_enabled = false;
    config
}

pub fn repo(module: &str) -> Repo {
    Repo {
        uri: format!("git://git.openstack.org/openstack/{}.git", module),
        module: module.to_string(),
        organization: Some("openstack".to_string()),
        default_branch: None,
        releases: Vec::new(),
        ci: Vec::new(),
    }
}

pub fn raw(id: &str, date: i64, email: &str) -> RawRecord {
    RawRecord {
        id: id.to_string(),
        date,
        author_email: Some(email.to_string()),
        author_name: Some(email.split('@').next().unwrap_or(email).to_string()),
        ..Default::default()
    }
}

/// Write one JSON document per line
pub fn write_jsonl(path: &Path, lines: &[serde_json::Value]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let content: String = lines.iter().map(|line| format!("{}\n", line)).collect();
    std::fs::write(path, content).unwrap();
}

/// Append lines to an existing JSON-lines file
pub fn append_jsonl(path: &Path, lines: &[serde_json::Value]) {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
}
