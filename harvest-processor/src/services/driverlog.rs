//! Third-party CI votes derived from review comments
//!
//! A driverlog document lists CI drivers per module: the review account the
//! CI posts as and regexes telling a passing run from a failing one. Every
//! review comment by such an account that matches a pattern becomes one
//! `ci_vote` record per (review, patch set, driver).

use harvest_common::models::{CiRuleConfig, Record, RecordKind};
use harvest_common::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::warn;

// ============================================================================
// Driverlog document
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DriverLog {
    #[serde(default)]
    pub drivers: Vec<Driver>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Driver {
    pub name: String,
    /// `<organization>/<module>`
    pub project_id: String,
    #[serde(default)]
    pub ci: Option<DriverCi>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverCi {
    pub id: String,
    #[serde(default)]
    pub success_pattern: Option<String>,
    #[serde(default)]
    pub failure_pattern: Option<String>,
}

impl DriverLog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::InvalidInput(format!("Driverlog {}: {}", path.display(), e)))
    }

    /// CI rules keyed by module name (lowercased)
    pub fn rules_by_module(&self) -> HashMap<String, Vec<CiRuleConfig>> {
        let mut rules: HashMap<String, Vec<CiRuleConfig>> = HashMap::new();
        for driver in &self.drivers {
            let Some(ci) = &driver.ci else { continue };
            let module = driver
                .project_id
                .rsplit('/')
                .next()
                .unwrap_or(&driver.project_id)
                .to_lowercase();
            rules.entry(module).or_default().push(CiRuleConfig {
                ci_id: ci.id.clone(),
                driver_name: driver.name.clone(),
                success_pattern: ci.success_pattern.clone(),
                failure_pattern: ci.failure_pattern.clone(),
            });
        }
        rules
    }
}

// ============================================================================
// Compiled rules
// ============================================================================

#[derive(Debug, Clone)]
struct CiRule {
    driver_name: String,
    success: Option<Regex>,
    failure: Option<Regex>,
}

impl CiRule {
    /// `Some(true)` for a pass, `Some(false)` for a failure, `None` otherwise
    fn verdict(&self, message: &str) -> Option<bool> {
        if self.success.as_ref().is_some_and(|re| re.is_match(message)) {
            return Some(true);
        }
        if self.failure.as_ref().is_some_and(|re| re.is_match(message)) {
            return Some(false);
        }
        None
    }
}

/// CI rules of one repository, indexed by reviewer account
#[derive(Debug, Clone, Default)]
pub struct CiRuleSet {
    rules: HashMap<String, Vec<CiRule>>,
}

impl CiRuleSet {
    /// Compile rule configs; a rule with an invalid pattern is logged and dropped
    pub fn compile(configs: &[CiRuleConfig]) -> Self {
        let mut rules: HashMap<String, Vec<CiRule>> = HashMap::new();
        for config in configs {
            match compile_rule(config) {
                Ok(rule) => rules.entry(config.ci_id.clone()).or_default().push(rule),
                Err(e) => warn!(
                    driver = %config.driver_name,
                    ci_id = %config.ci_id,
                    error = %e,
                    "Dropping CI rule with invalid pattern"
                ),
            }
        }
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Derive `ci_vote` records from a processed review
    ///
    /// Later comments of a driver on the same patch set override earlier ones.
    pub fn derive_votes(&self, review: &Record) -> Vec<Record> {
        if self.rules.is_empty() {
            return Vec::new();
        }
        let Some(comments) = review.fields.get("comments").and_then(Value::as_array) else {
            return Vec::new();
        };

        let mut votes: BTreeMap<String, Record> = BTreeMap::new();
        for comment in comments {
            let Ok(comment) = serde_json::from_value::<ReviewComment>(comment.clone()) else {
                continue;
            };
            let Some(rules) = self.rules.get(comment.reviewer.account()) else {
                continue;
            };
            let patch_set = comment.patch_set();

            for rule in rules {
                let Some(value) = rule.verdict(&comment.message) else {
                    continue;
                };
                let vote = ci_vote(review, &comment, patch_set, rule, value);
                votes.insert(vote.primary_key.clone(), vote);
            }
        }

        votes.into_values().collect()
    }
}

fn compile_rule(config: &CiRuleConfig) -> std::result::Result<CiRule, regex::Error> {
    let compile = |pattern: &Option<String>| pattern.as_deref().map(Regex::new).transpose();
    let rule = CiRule {
        driver_name: config.driver_name.clone(),
        success: compile(&config.success_pattern)?,
        failure: compile(&config.failure_pattern)?,
    };
    if rule.success.is_none() && rule.failure.is_none() {
        warn!(driver = %config.driver_name, "CI rule has no patterns and will never vote");
    }
    Ok(rule)
}

// ============================================================================
// Review comments
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reviewer {
    Account { username: String },
    Name(String),
}

impl Reviewer {
    fn account(&self) -> &str {
        match self {
            Reviewer::Account { username } => username,
            Reviewer::Name(name) => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReviewComment {
    reviewer: Reviewer,
    #[serde(default)]
    message: String,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    patch_set: Option<u32>,
}

impl ReviewComment {
    /// Explicit patch set, else the `Patch Set N:` prefix of the message
    fn patch_set(&self) -> u32 {
        if let Some(patch_set) = self.patch_set {
            return patch_set;
        }
        self.message
            .strip_prefix("Patch Set ")
            .and_then(|rest| rest.split(|c: char| !c.is_ascii_digit()).next())
            .and_then(|digits| digits.parse().ok())
            .unwrap_or(0)
    }
}

/// Release encoded in a branch name: `stable/havana` → `havana`
pub fn release_from_branch(branch: &str) -> Option<String> {
    let branch = branch.to_lowercase();
    match branch.rsplit_once('/') {
        Some((prefix, release)) if !prefix.is_empty() && !release.is_empty() => Some(release.to_string()),
        _ => None,
    }
}

fn ci_vote(review: &Record, comment: &ReviewComment, patch_set: u32, rule: &CiRule, value: bool) -> Record {
    let mut fields = Map::new();
    fields.insert("review_id".to_string(), json!(review.primary_key));
    fields.insert("patch_set".to_string(), json!(patch_set));
    fields.insert("ci_id".to_string(), json!(comment.reviewer.account()));
    fields.insert("driver_name".to_string(), json!(rule.driver_name));
    fields.insert("value".to_string(), json!(value));
    fields.insert("message".to_string(), json!(comment.message));

    Record {
        record_type: RecordKind::CiVote,
        primary_key: format!("{}:{}:{}", review.primary_key, patch_set, rule.driver_name),
        date: if comment.timestamp > 0 { comment.timestamp } else { review.date },
        author_email: None,
        author_name: None,
        user_id: None,
        person_id: None,
        company_name: None,
        module: review.module.clone(),
        branch: review.branch.clone(),
        branches: Default::default(),
        release: review.branch.as_deref().and_then(release_from_branch),
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_common::models::RawRecord;

    fn rules() -> CiRuleSet {
        CiRuleSet::compile(&[CiRuleConfig {
            ci_id: "nec-ci".to_string(),
            driver_name: "NEC OpenFlow Driver".to_string(),
            success_pattern: Some(r"Build succeeded".to_string()),
            failure_pattern: Some(r"Build failed".to_string()),
        }])
    }

    fn review(branch: &str, comments: Value) -> Record {
        let mut raw = RawRecord {
            id: "I0123".to_string(),
            date: 1_400_000_000,
            module: Some("neutron".to_string()),
            branch: Some(branch.to_string()),
            ..Default::default()
        };
        raw.fields.insert("comments".to_string(), comments);
        Record::from_raw(RecordKind::Review, raw)
    }

    #[test]
    fn test_release_from_branch() {
        assert_eq!(release_from_branch("stable/Havana").as_deref(), Some("havana"));
        assert_eq!(release_from_branch("master"), None);
        assert_eq!(release_from_branch("/havana"), None);
    }

    #[test]
    fn test_votes_from_ci_comments() {
        let review = review(
            "stable/havana",
            json!([
                {"reviewer": {"username": "nec-ci"}, "message": "Patch Set 1: Build failed.", "timestamp": 1_400_000_100},
                {"reviewer": {"username": "nec-ci"}, "message": "Patch Set 2: Build succeeded.", "timestamp": 1_400_000_200},
                {"reviewer": {"username": "jdoe"}, "message": "Patch Set 2: Build succeeded? Looks good", "timestamp": 1_400_000_300}
            ]),
        );

        let votes = rules().derive_votes(&review);

        assert_eq!(votes.len(), 2);
        let first = &votes[0];
        assert_eq!(first.record_type, RecordKind::CiVote);
        assert_eq!(first.primary_key, "I0123:1:NEC OpenFlow Driver");
        assert_eq!(first.fields["value"], json!(false));
        assert_eq!(first.release.as_deref(), Some("havana"));
        assert_eq!(first.module.as_deref(), Some("neutron"));
        assert_eq!(votes[1].fields["value"], json!(true));
        assert_eq!(votes[1].date, 1_400_000_200);
    }

    #[test]
    fn test_later_comment_overrides_same_patch_set() {
        let review = review(
            "master",
            json!([
                {"reviewer": "nec-ci", "message": "Build failed", "patch_set": 3},
                {"reviewer": "nec-ci", "message": "recheck: Build succeeded", "patch_set": 3}
            ]),
        );

        let votes = rules().derive_votes(&review);

        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].fields["value"], json!(true));
        assert_eq!(votes[0].release, None);
    }

    #[test]
    fn test_invalid_pattern_is_dropped() {
        let rules = CiRuleSet::compile(&[CiRuleConfig {
            ci_id: "broken-ci".to_string(),
            driver_name: "Broken".to_string(),
            success_pattern: Some("(unclosed".to_string()),
            failure_pattern: None,
        }]);
        assert!(rules.is_empty());
    }

    #[test]
    fn test_driverlog_rules_by_module() {
        let driverlog: DriverLog = serde_json::from_value(json!({
            "drivers": [
                {"name": "NEC OpenFlow Driver", "project_id": "openstack/neutron",
                 "ci": {"id": "nec-ci", "success_pattern": "Build succeeded"}},
                {"name": "Docs only", "project_id": "openstack/nova"}
            ]
        }))
        .unwrap();

        let rules = driverlog.rules_by_module();
        assert_eq!(rules["neutron"].len(), 1);
        assert_eq!(rules["neutron"][0].ci_id, "nec-ci");
        assert!(!rules.contains_key("nova"));
    }
}
