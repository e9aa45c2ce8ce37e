//! Identity directory client
//!
//! Maps an email address to a canonical person id and display name. The
//! production backend is the Launchpad people API, queried with rate
//! limiting and a hard timeout. Directory failures never escape this module:
//! every error is logged and reported as "no match".

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const USER_AGENT: &str = concat!("harvest-processor/", env!("CARGO_PKG_VERSION"));

/// Directory client errors (internal; callers only see `None`)
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Canonical identity returned by the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryProfile {
    pub canonical_id: String,
    pub display_name: String,
}

/// Pluggable email → identity lookup
///
/// Implementations must not fail: network errors and timeouts surface as
/// `None`, the same as "no such person".
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn lookup(&self, email: &str) -> Option<DirectoryProfile>;
}

/// Directory used when lookups are disabled
pub struct NullDirectory;

#[async_trait]
impl IdentityDirectory for NullDirectory {
    async fn lookup(&self, _email: &str) -> Option<DirectoryProfile> {
        None
    }
}

/// Launchpad person record (subset)
#[derive(Debug, Deserialize)]
struct LaunchpadPerson {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Rate limiter enforcing a minimum interval between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with rate limit
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::trace!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Launchpad-backed identity directory
pub struct LaunchpadDirectory {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    rate_limiter: Arc<RateLimiter>,
}

impl LaunchpadDirectory {
    pub fn new(base_url: &str, timeout: Duration, min_interval_ms: u64) -> Result<Self, DirectoryError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            rate_limiter: Arc::new(RateLimiter::new(min_interval_ms)),
        })
    }

    fn lookup_url(&self, email: &str) -> Result<url::Url, DirectoryError> {
        let mut url = url::Url::parse(&format!("{}/people", self.base_url))
            .map_err(|e| DirectoryError::ParseError(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("ws.op", "getByEmail")
            .append_pair("email", email);
        Ok(url)
    }

    /// Query the directory, distinguishing "no match" from failure
    pub async fn try_lookup(&self, email: &str) -> Result<Option<DirectoryProfile>, DirectoryError> {
        self.rate_limiter.wait().await;

        let url = self.lookup_url(email)?;
        tracing::debug!(email = %email, "Querying identity directory");

        let request = self.http_client.get(url).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| DirectoryError::Timeout(self.timeout))?
            .map_err(|e| DirectoryError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status == 404 {
            return Ok(None);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DirectoryError::ApiError(status.as_u16(), error_text));
        }

        // A miss comes back as a JSON `null`
        let person: Option<LaunchpadPerson> = response
            .json()
            .await
            .map_err(|e| DirectoryError::ParseError(e.to_string()))?;

        Ok(person.and_then(|p| {
            if p.name.trim().is_empty() {
                return None;
            }
            Some(DirectoryProfile {
                display_name: p.display_name.unwrap_or_else(|| p.name.clone()),
                canonical_id: p.name,
            })
        }))
    }
}

#[async_trait]
impl IdentityDirectory for LaunchpadDirectory {
    async fn lookup(&self, email: &str) -> Option<DirectoryProfile> {
        match self.try_lookup(email).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(email = %email, error = %e, "Identity directory lookup failed");
                None
            }
        }
    }
}
