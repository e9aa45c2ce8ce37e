//! Official project list and module groups
//!
//! Module groups live under the `module_groups` scalar key as a map
//! id → group. Official programs come from the project list document; every
//! harvested module also gets a single-module group, and the `unknown`
//! group always exists.

use harvest_common::models::{ModuleGroup, Repo};
use harvest_common::{Error, KeyedStore, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

pub const MODULE_GROUPS_KEY: &str = "module_groups";
pub const UNKNOWN_GROUP: &str = "unknown";

const PROGRAM_TAG: &str = "program";
const MODULE_TAG: &str = "module";

/// Project list document: program name → member modules
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectList {
    #[serde(default)]
    pub programs: BTreeMap<String, Program>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub modules: Vec<String>,
}

pub fn load_project_list(path: &Path) -> Result<ProjectList> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read project list {} failed: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::InvalidInput(format!("Project list {}: {}", path.display(), e)))
}

impl ProjectList {
    /// One group per official program
    pub fn module_groups(&self) -> Vec<ModuleGroup> {
        self.programs
            .iter()
            .map(|(name, program)| ModuleGroup {
                id: name.to_lowercase(),
                module_group_name: name.clone(),
                modules: program.modules.iter().map(|m| m.to_lowercase()).collect(),
                tag: PROGRAM_TAG.to_string(),
            })
            .collect()
    }
}

/// Merge `groups` and per-repo module groups into the stored map
pub async fn update_module_groups(
    store: &KeyedStore,
    repos: &[Repo],
    groups: Vec<ModuleGroup>,
) -> Result<BTreeMap<String, ModuleGroup>> {
    let mut stored: BTreeMap<String, ModuleGroup> =
        store.get_by_key(MODULE_GROUPS_KEY).await?.unwrap_or_default();

    for group in groups {
        stored.insert(group.id.clone(), group);
    }

    for repo in repos {
        let module = repo.module.to_lowercase();
        stored
            .entry(module.clone())
            .or_insert_with(|| ModuleGroup::single(&module, MODULE_TAG));
    }

    stored.entry(UNKNOWN_GROUP.to_string()).or_insert_with(|| ModuleGroup {
        id: UNKNOWN_GROUP.to_string(),
        module_group_name: UNKNOWN_GROUP.to_string(),
        modules: BTreeSet::new(),
        tag: MODULE_TAG.to_string(),
    });

    store.set_by_key(MODULE_GROUPS_KEY, &stored).await?;
    info!(groups = stored.len(), "Module groups updated");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repo(module: &str) -> Repo {
        serde_json::from_value(json!({"uri": format!("git://example.org/{}.git", module), "module": module}))
            .unwrap()
    }

    #[tokio::test]
    async fn test_groups_from_project_list_and_repos() {
        let store = KeyedStore::in_memory().await.unwrap();
        let list: ProjectList = serde_json::from_value(json!({
            "programs": {"Compute": {"modules": ["nova", "python-novaclient"]}}
        }))
        .unwrap();

        let groups = update_module_groups(&store, &[repo("nova")], list.module_groups())
            .await
            .unwrap();

        assert_eq!(groups["compute"].tag, "program");
        assert!(groups["compute"].modules.contains("python-novaclient"));
        assert_eq!(groups["nova"].tag, "module");
        assert!(groups.contains_key(UNKNOWN_GROUP));

        let stored: BTreeMap<String, ModuleGroup> =
            store.get_by_key(MODULE_GROUPS_KEY).await.unwrap().unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_group_without_any_input() {
        let store = KeyedStore::in_memory().await.unwrap();
        let groups = update_module_groups(&store, &[], Vec::new()).await.unwrap();
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["unknown"]);
    }
}
