//! Email domain → company matching
//!
//! Domains are matched on label boundaries and the longest registered
//! suffix wins, so `nec.co.jp` beats `co.jp` for `man@mxw.nes.nec.co.jp`.

use harvest_common::models::Company;
use std::collections::HashMap;

/// Domain part of an email address, lowercased
///
/// `None` for anything without a non-empty domain after the last `@`.
pub fn email_domain(email: &str) -> Option<String> {
    let (local, domain) = email.trim().rsplit_once('@')?;
    let domain = domain.trim_matches('.');
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(domain.to_lowercase())
}

/// Lookup table of every domain claimed by a company
#[derive(Debug, Clone, Default)]
pub struct DomainIndex {
    domains: HashMap<String, String>,
}

impl DomainIndex {
    pub fn new(companies: &[Company]) -> Self {
        let mut domains = HashMap::new();
        for company in companies {
            for domain in &company.domains {
                let domain = domain.trim().trim_matches('.').to_lowercase();
                if domain.is_empty() {
                    continue;
                }
                if let Some(previous) = domains.insert(domain.clone(), company.company_name.clone()) {
                    if previous != company.company_name {
                        tracing::warn!(
                            domain = %domain,
                            kept = %company.company_name,
                            dropped = %previous,
                            "Domain claimed by two companies"
                        );
                    }
                }
            }
        }
        Self { domains }
    }

    /// Company owning the longest registered suffix of the email's domain
    pub fn match_email(&self, email: &str) -> Option<&str> {
        let domain = email_domain(email)?;
        let mut candidate = domain.as_str();
        loop {
            if let Some(company) = self.domains.get(candidate) {
                return Some(company.as_str());
            }
            // Drop the leftmost label and try the shorter suffix
            match candidate.split_once('.') {
                Some((_, rest)) if !rest.is_empty() => candidate = rest,
                _ => return None,
            }
        }
    }
}
