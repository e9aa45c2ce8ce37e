//! People, their employment history, and companies

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Fallback company for people with no membership and no matching domain
pub const INDEPENDENT: &str = "*independent";

/// Time-bounded company membership; `end_date == 0` means still current
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    pub company_name: String,
    #[serde(default)]
    pub end_date: i64,
}

impl Membership {
    pub fn new(company_name: impl Into<String>, end_date: i64) -> Self {
        Self {
            company_name: company_name.into(),
            end_date,
        }
    }

    pub fn is_open_ended(&self) -> bool {
        self.end_date == 0
    }
}

/// A unique contributor identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Person {
    /// Storage id: the directory id when known, otherwise the first email seen
    pub user_id: String,
    /// Canonical id from the identity directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub emails: BTreeSet<String>,
    /// Sorted ascending by end date, open-ended entry (if any) last
    #[serde(default)]
    pub companies: Vec<Membership>,
}

impl Person {
    /// Person linked to an identity directory entry
    pub fn linked(external_id: impl Into<String>, user_name: impl Into<String>, email: &str) -> Self {
        let external_id = external_id.into();
        Self {
            user_id: external_id.clone(),
            external_id: Some(external_id),
            user_name: user_name.into(),
            emails: BTreeSet::from([email.to_lowercase()]),
            companies: Vec::new(),
        }
    }

    /// Person with no directory entry, keyed by email
    pub fn unlinked(user_name: impl Into<String>, email: &str) -> Self {
        let email = email.to_lowercase();
        Self {
            user_id: email.clone(),
            external_id: None,
            user_name: user_name.into(),
            emails: BTreeSet::from([email]),
            companies: Vec::new(),
        }
    }

    /// Restore the membership ordering invariant
    ///
    /// Bounded memberships sort ascending by end date; only the last
    /// open-ended entry survives and goes to the end.
    pub fn normalize_companies(&mut self) {
        let open_ended = self
            .companies
            .iter()
            .rev()
            .find(|m| m.is_open_ended())
            .cloned();
        self.companies.retain(|m| !m.is_open_ended());
        self.companies.sort_by_key(|m| m.end_date);
        if let Some(current) = open_ended {
            self.companies.push(current);
        }
    }

    /// Company the person belonged to at `timestamp`
    ///
    /// First membership ending after `timestamp`; past every bounded
    /// membership the last entry applies. `None` when no memberships exist.
    pub fn company_at(&self, timestamp: i64) -> Option<&str> {
        self.companies
            .iter()
            .find(|m| m.is_open_ended() || m.end_date > timestamp)
            .or_else(|| self.companies.last())
            .map(|m| m.company_name.as_str())
    }

    pub fn has_email(&self, email: &str) -> bool {
        self.emails.contains(&email.to_lowercase())
    }
}

/// A company and the email domains it claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    pub company_name: String,
    #[serde(default)]
    pub domains: Vec<String>,
}

impl Company {
    pub fn new<I, S>(company_name: impl Into<String>, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            company_name: company_name.into(),
            domains: domains.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn john() -> Person {
        let mut person = Person::linked("john_doe", "John Doe", "johndoe@gmail.com");
        person.emails.insert("jdoe@super.no".to_string());
        person.companies = vec![
            Membership::new(INDEPENDENT, 1_234_567_890),
            Membership::new("SuperCompany", 0),
        ];
        person
    }

    #[test]
    fn test_company_at_after_all_boundaries_uses_current() {
        assert_eq!(john().company_at(1_999_999_999), Some("SuperCompany"));
    }

    #[test]
    fn test_company_at_before_first_boundary() {
        assert_eq!(john().company_at(1_000_000_000), Some(INDEPENDENT));
    }

    #[test]
    fn test_company_at_without_open_ended_uses_latest_bounded() {
        let mut person = Person::unlinked("Ann", "ann@example.org");
        person.companies = vec![Membership::new("A", 100), Membership::new("B", 200)];
        assert_eq!(person.company_at(150), Some("B"));
        assert_eq!(person.company_at(500), Some("B"));
    }

    #[test]
    fn test_company_at_no_memberships() {
        let person = Person::unlinked("Ann", "ann@example.org");
        assert_eq!(person.company_at(0), None);
    }

    #[test]
    fn test_normalize_puts_open_ended_last() {
        let mut person = Person::unlinked("Ann", "ann@example.org");
        person.companies = vec![
            Membership::new("Earlier", 0),
            Membership::new("B", 200),
            Membership::new("Current", 0),
            Membership::new("A", 100),
        ];
        person.normalize_companies();
        let names: Vec<_> = person.companies.iter().map(|m| m.company_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "Current"]);
    }

    #[test]
    fn test_has_email_is_case_insensitive() {
        assert!(john().has_email("JDoe@Super.no"));
    }
}
