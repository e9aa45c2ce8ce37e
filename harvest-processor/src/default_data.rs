//! Default data bootstrap
//!
//! The default data document seeds the store before harvesting: companies
//! and users go to their namespaces; releases, repos, mail and member lists
//! and predefined module groups go to well-known scalar keys. A missing or
//! unparseable document is fatal for the run.

use harvest_common::models::{CiRuleConfig, Company, Membership, ModuleGroup, Person, Release, Repo};
use harvest_common::time::date_to_timestamp;
use harvest_common::{Error, KeyedStore, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

pub const RELEASES_KEY: &str = "releases";
pub const REPOS_KEY: &str = "repos";
pub const MAIL_LISTS_KEY: &str = "mail_lists";
pub const MEMBER_LISTS_KEY: &str = "member_lists";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultData {
    #[serde(default)]
    pub companies: Vec<Company>,
    #[serde(default)]
    pub users: Vec<UserEntry>,
    #[serde(default)]
    pub releases: Vec<ReleaseEntry>,
    #[serde(default)]
    pub repos: Vec<Repo>,
    #[serde(default)]
    pub mail_lists: Vec<String>,
    #[serde(default)]
    pub member_lists: Vec<String>,
    #[serde(default)]
    pub module_groups: Vec<ModuleGroup>,
}

/// Date as written in default data: a `2013-Jan-01` string, Unix seconds,
/// or null for "open-ended"
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DateValue {
    Timestamp(i64),
    Text(String),
}

impl DateValue {
    fn to_timestamp(&self) -> Result<i64> {
        match self {
            DateValue::Timestamp(ts) => Ok(*ts),
            DateValue::Text(text) => date_to_timestamp(text),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    /// Identity directory id, when the user has one
    #[serde(default)]
    pub launchpad_id: Option<String>,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub companies: Vec<MembershipEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MembershipEntry {
    pub company_name: String,
    #[serde(default)]
    pub end_date: Option<DateValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseEntry {
    pub release_name: String,
    pub end_date: DateValue,
}

/// Read and parse the default data document
pub fn load_default_data(path: &Path) -> Result<DefaultData> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read default data {} failed: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::InvalidInput(format!("Default data {}: {}", path.display(), e)))
}

impl UserEntry {
    /// Person built from this entry; `None` when it has neither id nor email
    fn to_person(&self) -> Result<Option<Person>> {
        let mut emails = self.emails.iter().map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());
        let first_email = emails.next();

        let mut person = match (&self.launchpad_id, &first_email) {
            (Some(id), Some(email)) => Person::linked(id.as_str(), self.user_name.as_str(), email),
            (Some(id), None) => {
                let mut person = Person::linked(id.as_str(), self.user_name.as_str(), "");
                person.emails.clear();
                person
            }
            (None, Some(email)) => Person::unlinked(self.user_name.as_str(), email),
            (None, None) => return Ok(None),
        };
        person.emails.extend(emails);

        for entry in &self.companies {
            let end_date = match &entry.end_date {
                Some(date) => date.to_timestamp()?,
                None => 0,
            };
            person.companies.push(Membership::new(entry.company_name.as_str(), end_date));
        }

        Ok(Some(person))
    }
}

/// Write the default data into the store
///
/// `ci_rules` (module → rules, from the driverlog) are attached to the
/// matching repos before the repo list is stored.
pub async fn store_default_data(
    store: &KeyedStore,
    data: &DefaultData,
    ci_rules: &HashMap<String, Vec<CiRuleConfig>>,
) -> Result<()> {
    for company in &data.companies {
        store.store_company(company).await?;
    }

    let mut users = 0;
    for entry in &data.users {
        let Some(mut person) = entry.to_person()? else {
            warn!(user_name = %entry.user_name, "User without id or email skipped");
            continue;
        };
        // Keep emails harvested since the last bootstrap
        if let Some(stored) = store.get_person(&person.user_id).await? {
            person.emails.extend(stored.emails);
        }
        store.store_person(&person).await?;
        users += 1;
    }

    let releases = data
        .releases
        .iter()
        .map(|r| Ok(Release::new(r.release_name.as_str(), r.end_date.to_timestamp()?)))
        .collect::<Result<Vec<_>>>()?;
    store.set_by_key(RELEASES_KEY, &releases).await?;

    let repos: Vec<Repo> = data
        .repos
        .iter()
        .cloned()
        .map(|mut repo| {
            if let Some(rules) = ci_rules.get(&repo.module.to_lowercase()) {
                repo.ci.extend(rules.iter().cloned());
            }
            repo
        })
        .collect();
    store.set_by_key(REPOS_KEY, &repos).await?;
    store.set_by_key(MAIL_LISTS_KEY, &data.mail_lists).await?;
    store.set_by_key(MEMBER_LISTS_KEY, &data.member_lists).await?;

    info!(
        companies = data.companies.len(),
        users,
        releases = releases.len(),
        repos = repos.len(),
        mail_lists = data.mail_lists.len(),
        member_lists = data.member_lists.len(),
        "Default data stored"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_common::models::INDEPENDENT;
    use serde_json::json;

    fn data() -> DefaultData {
        serde_json::from_value(json!({
            "companies": [{"company_name": "NEC", "domains": ["nec.com", "nec.co.jp"]}],
            "users": [
                {"launchpad_id": "john_doe", "user_name": "John Doe",
                 "emails": ["JohnDoe@gmail.com", "jdoe@super.no"],
                 "companies": [
                     {"company_name": "*independent", "end_date": 1234567890},
                     {"company_name": "SuperCompany", "end_date": null}
                 ]},
                {"user_name": "Nobody"}
            ],
            "releases": [
                {"release_name": "prehistory", "end_date": "2011-Apr-21"},
                {"release_name": "Diablo", "end_date": "2011-Sep-08"}
            ],
            "repos": [{"uri": "git://git.openstack.org/openstack/neutron.git", "module": "neutron"}],
            "mail_lists": ["openstack-dev"]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_store_default_data() {
        let store = KeyedStore::in_memory().await.unwrap();
        let rules = HashMap::from([(
            "neutron".to_string(),
            vec![CiRuleConfig {
                ci_id: "nec-ci".to_string(),
                driver_name: "NEC".to_string(),
                success_pattern: Some("Build succeeded".to_string()),
                failure_pattern: None,
            }],
        )]);

        store_default_data(&store, &data(), &rules).await.unwrap();

        let john = store.find_person_by_email("jdoe@super.no").await.unwrap().unwrap();
        assert_eq!(john.user_id, "john_doe");
        assert_eq!(john.company_at(1_000_000_000), Some(INDEPENDENT));
        assert_eq!(john.company_at(1_999_999_999), Some("SuperCompany"));
        assert_eq!(store.count_persons().await.unwrap(), 1);

        let releases: Vec<Release> = store.get_by_key(RELEASES_KEY).await.unwrap().unwrap();
        assert_eq!(releases[0].end_date, 1_303_344_000);

        let repos: Vec<Repo> = store.get_by_key(REPOS_KEY).await.unwrap().unwrap();
        assert_eq!(repos[0].ci.len(), 1);

        let member_lists: Vec<String> = store.get_by_key(MEMBER_LISTS_KEY).await.unwrap().unwrap();
        assert!(member_lists.is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_keeps_harvested_emails() {
        let store = KeyedStore::in_memory().await.unwrap();
        store
            .insert_person(&Person::linked("john_doe", "John", "johndoe@nec.co.jp"))
            .await
            .unwrap();

        store_default_data(&store, &data(), &HashMap::new()).await.unwrap();

        let john = store.get_person("john_doe").await.unwrap().unwrap();
        assert!(john.has_email("johndoe@nec.co.jp"));
        assert!(john.has_email("johndoe@gmail.com"));
        assert_eq!(john.user_name, "John Doe");
    }

    #[test]
    fn test_missing_document_is_an_error() {
        assert!(load_default_data(Path::new("/nonexistent/default_data.json")).is_err());
    }
}
