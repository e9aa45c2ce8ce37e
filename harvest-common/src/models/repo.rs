//! Harvest targets: repositories, CI rules, module groups

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Branch harvested when a repo does not name one
pub const DEFAULT_BRANCH: &str = "master";

/// A source repository and its release branches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repo {
    pub uri: String,
    pub module: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub releases: Vec<RepoRelease>,
    /// Third-party CI systems voting on this repo's reviews
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ci: Vec<CiRuleConfig>,
}

impl Repo {
    /// Default branch plus every release branch
    pub fn branches(&self) -> BTreeSet<String> {
        let mut branches = BTreeSet::new();
        branches.insert(
            self.default_branch
                .clone()
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        );
        for release in &self.releases {
            if let Some(branch) = &release.branch {
                branches.insert(branch.clone());
            }
        }
        branches
    }
}

/// Release descriptor of a repo (tag range and optional stable branch)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoRelease {
    pub release_name: String,
    #[serde(default)]
    pub tag_from: Option<String>,
    #[serde(default)]
    pub tag_to: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
}

/// CI driver rule: which reviewer account is the CI and how to read its verdict
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CiRuleConfig {
    /// Review-system account the CI posts as
    pub ci_id: String,
    pub driver_name: String,
    #[serde(default)]
    pub success_pattern: Option<String>,
    #[serde(default)]
    pub failure_pattern: Option<String>,
}

/// Named group of modules (official program or single module)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleGroup {
    pub id: String,
    pub module_group_name: String,
    #[serde(default)]
    pub modules: BTreeSet<String>,
    #[serde(default)]
    pub tag: String,
}

impl ModuleGroup {
    /// Group containing exactly one module
    pub fn single(module: &str, tag: &str) -> Self {
        Self {
            id: module.to_string(),
            module_group_name: module.to_string(),
            modules: BTreeSet::from([module.to_string()]),
            tag: tag.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(name: &str, branch: Option<&str>) -> RepoRelease {
        RepoRelease {
            release_name: name.to_string(),
            tag_from: None,
            tag_to: None,
            branch: branch.map(str::to_string),
        }
    }

    #[test]
    fn test_branches_default_to_master() {
        let repo = Repo {
            uri: "git://example.org/nova.git".to_string(),
            module: "nova".to_string(),
            organization: None,
            default_branch: None,
            releases: vec![release("Havana", Some("stable/havana")), release("Icehouse", None)],
            ci: Vec::new(),
        };
        let branches: Vec<_> = repo.branches().into_iter().collect();
        assert_eq!(branches, vec!["master", "stable/havana"]);
    }

    #[test]
    fn test_branches_respect_default_branch() {
        let repo: Repo = serde_json::from_str(
            r#"{"uri": "u", "module": "m", "default_branch": "main"}"#,
        )
        .unwrap();
        assert_eq!(repo.branches().into_iter().collect::<Vec<_>>(), vec!["main"]);
    }
}
