//! Runtime configuration for the sync pipeline.
//!
//! [`SyncConfig`] is a plain struct with defaults matching MangaDex's public
//! rate limits. The binary fills it from a TOML file and CLI flags and calls
//! [`SyncConfig::validate`] before building the pipeline.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::api::{ClassBudget, DEFAULT_BASE_URL, PageQuality, RetryPolicy};
use crate::catalog::RefreshPolicy;

/// Default number of titles requested per catalog page.
pub const DEFAULT_BATCH_SIZE: u32 = 25;

/// Default number of titles processed concurrently within a page.
pub const DEFAULT_ITEM_CONCURRENCY: usize = 10;

/// Default pause between catalog pages.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(5);

/// Default consecutive page failures tolerated before a run aborts.
pub const DEFAULT_MAX_PAGE_RETRIES: u32 = 5;

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid configuration value for {field}: {reason}")]
pub struct ConfigError {
    /// Name of the offending setting.
    pub field: &'static str,
    /// What is wrong with it.
    pub reason: String,
}

impl ConfigError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// All tunables of the client, retry wrapper and batch loader.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// API base URL.
    pub base_url: String,
    /// Budget of the general endpoint class.
    pub general_budget: ClassBudget,
    /// Budget of the page-server endpoint class.
    pub page_server_budget: ClassBudget,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub request_timeout: Duration,
    /// Retries after the first attempt for transient network failures.
    pub max_retries: u32,
    /// Wait before the first retry.
    pub retry_base_delay: Duration,
    /// Upper bound on a single retry wait.
    pub retry_max_delay: Duration,
    /// Upper bound on random jitter added to retry waits.
    pub retry_jitter: Duration,
    /// Wait applied to a 429 without a usable Retry-After header.
    pub rate_limit_fallback: Duration,
    /// Consecutive 429 responses tolerated for one call.
    pub max_rate_limit_waits: u32,
    /// Titles requested per catalog page.
    pub batch_size: u32,
    /// Titles processed concurrently within a page.
    pub item_concurrency: usize,
    /// Pause after every catalog page.
    pub batch_delay: Duration,
    /// Consecutive page failures before a run aborts.
    pub max_page_retries: u32,
    /// Image quality recorded for chapter pages.
    pub page_quality: PageQuality,
    /// Which chapters get their pages fetched on a sync.
    pub refresh_policy: RefreshPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            general_budget: ClassBudget::general(),
            page_server_budget: ClassBudget::page_server(),
            connect_timeout: Duration::from_secs(crate::api::CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(crate::api::REQUEST_TIMEOUT_SECS),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(10),
            retry_jitter: Duration::ZERO,
            rate_limit_fallback: crate::api::DEFAULT_RATE_LIMIT_FALLBACK,
            max_rate_limit_waits: crate::api::DEFAULT_MAX_RATE_LIMIT_WAITS,
            batch_size: DEFAULT_BATCH_SIZE,
            item_concurrency: DEFAULT_ITEM_CONCURRENCY,
            batch_delay: DEFAULT_BATCH_DELAY,
            max_page_retries: DEFAULT_MAX_PAGE_RETRIES,
            page_quality: PageQuality::default(),
            refresh_policy: RefreshPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::new("base_url", format!("'{}': {e}", self.base_url)))?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::new("base_url", "must be an http(s) URL"));
        }

        for (field, budget) in [
            ("general_budget", &self.general_budget),
            ("page_server_budget", &self.page_server_budget),
        ] {
            if budget.requests_per_window == 0 {
                return Err(ConfigError::new(field, "requests_per_window must be at least 1"));
            }
            if budget.window.is_zero() {
                return Err(ConfigError::new(field, "window must be non-zero"));
            }
            if budget.max_concurrent == 0 {
                return Err(ConfigError::new(field, "max_concurrent must be at least 1"));
            }
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::new("request_timeout", "must be non-zero"));
        }
        if self.retry_max_delay < self.retry_base_delay {
            return Err(ConfigError::new(
                "retry_max_delay",
                "must not be shorter than retry_base_delay",
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::new("batch_size", "must be at least 1"));
        }
        if self.item_concurrency == 0 {
            return Err(ConfigError::new("item_concurrency", "must be at least 1"));
        }
        if self.max_page_retries == 0 {
            return Err(ConfigError::new("max_page_retries", "must be at least 1"));
        }
        Ok(())
    }

    /// Retry policy for remote calls derived from the retry settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries.saturating_add(1),
            self.retry_base_delay,
            self.retry_max_delay,
            2.0,
        )
        .with_jitter(self.retry_jitter)
    }
}
