//! Attribution resolver
//!
//! Resolves an author email/name pair to a stored person and to the company
//! that person worked for when the activity happened.
//!
//! Company precedence:
//! - email already on record: membership history, then domain, then fallback
//! - email new to the person (or new person): domain, then membership, then fallback
//!
//! Persons are never cached in memory; every change is a read-modify-write
//! through the store so concurrent repository workers stay consistent.

use harvest_common::models::{Person, INDEPENDENT};
use harvest_common::{KeyedStore, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::company_matcher::{email_domain, DomainIndex};
use super::identity_directory::{DirectoryProfile, IdentityDirectory};

/// Who an activity item is attributed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    /// Stored person id; `None` for anonymous authors
    pub user_id: Option<String>,
    /// Canonical directory id; `None` for anonymous or unlinked authors
    pub person_id: Option<String>,
    pub company_name: String,
}

impl Attribution {
    fn anonymous() -> Self {
        Self {
            user_id: None,
            person_id: None,
            company_name: INDEPENDENT.to_string(),
        }
    }
}

pub struct AttributionResolver {
    store: KeyedStore,
    directory: Arc<dyn IdentityDirectory>,
    domains: DomainIndex,
    lookup_timeout: Duration,
}

impl AttributionResolver {
    /// Build a resolver using the companies currently in the store
    pub async fn new(
        store: KeyedStore,
        directory: Arc<dyn IdentityDirectory>,
        lookup_timeout: Duration,
    ) -> Result<Self> {
        let companies = store.companies().await?;
        let domains = DomainIndex::new(&companies);
        debug!(companies = companies.len(), "Loaded company domains");

        Ok(Self {
            store,
            directory,
            domains,
            lookup_timeout,
        })
    }

    /// Resolve `email` as of `timestamp`
    ///
    /// Malformed emails degrade to an anonymous attribution without touching
    /// the directory. Only store failures are errors.
    pub async fn resolve(&self, email: &str, display_name: &str, timestamp: i64) -> Result<Attribution> {
        let email = email.trim().to_lowercase();
        if email_domain(&email).is_none() {
            debug!(email = %email, "Author email has no domain, attributing anonymously");
            return Ok(Attribution::anonymous());
        }

        if let Some(person) = self.store.find_person_by_email(&email).await? {
            let company = person
                .company_at(timestamp)
                .or_else(|| self.domains.match_email(&email))
                .unwrap_or(INDEPENDENT);
            return Ok(attribution(&person, company));
        }

        let person = match self.lookup(&email).await {
            Some(profile) => self.link_person(profile, &email).await?,
            None => {
                let name = if display_name.trim().is_empty() {
                    email.as_str()
                } else {
                    display_name.trim()
                };
                self.store.insert_person(&Person::unlinked(name, &email)).await?
            }
        };

        let company = self
            .domains
            .match_email(&email)
            .or_else(|| person.company_at(timestamp))
            .unwrap_or(INDEPENDENT);
        Ok(attribution(&person, company))
    }

    /// Attach `email` to the directory person, creating it if needed
    async fn link_person(&self, profile: DirectoryProfile, email: &str) -> Result<Person> {
        match self.store.find_person_by_external_id(&profile.canonical_id).await? {
            Some(existing) => {
                debug!(
                    user_id = %existing.user_id,
                    email = %email,
                    "Known directory person seen with new email"
                );
                self.store.add_person_email(&existing.user_id, email).await
            }
            None => {
                let person = Person::linked(profile.canonical_id, profile.display_name, email);
                let stored = self.store.insert_person(&person).await?;
                if stored.has_email(email) {
                    Ok(stored)
                } else {
                    // Lost a creation race to another worker
                    self.store.add_person_email(&stored.user_id, email).await
                }
            }
        }
    }

    async fn lookup(&self, email: &str) -> Option<DirectoryProfile> {
        match tokio::time::timeout(self.lookup_timeout, self.directory.lookup(email)).await {
            Ok(profile) => profile,
            Err(_) => {
                warn!(
                    email = %email,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "Identity directory lookup timed out"
                );
                None
            }
        }
    }
}

fn attribution(person: &Person, company: &str) -> Attribution {
    Attribution {
        user_id: Some(person.user_id.clone()),
        person_id: person.external_id.clone(),
        company_name: company.to_string(),
    }
}
