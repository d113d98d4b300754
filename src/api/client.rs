//! Rate-limited MangaDex API client.
//!
//! [`MangaDexClient`] turns typed operations into GET requests, routes each
//! through the [`RateLimiter`] of its endpoint class, waits out 429 responses
//! and retries transient network failures through [`with_retry`].
//!
//! # Example
//!
//! ```no_run
//! use manga_sync_core::api::MangaDexClient;
//!
//! # async fn example() -> Result<(), manga_sync_core::api::ApiError> {
//! let client = MangaDexClient::new("https://api.mangadex.org")?;
//! let page = client.list_manga(0, 25, None).await?;
//! for manga in &page.data {
//!     println!("{}", manga.id);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{
    CHAPTER_FEED_PAGE_SIZE, DEFAULT_MAX_RATE_LIMIT_WAITS, DEFAULT_RATE_LIMIT_FALLBACK,
};
use super::error::ApiError;
use super::rate_limiter::{EndpointClass, QuotaHint, RateLimiter, parse_retry_after};
use super::retry::{RetryPolicy, with_retry};
use super::source::CatalogSource;
use super::transport::{ReqwestTransport, Transport, TransportResponse};
use super::types::{
    AtHomeResponse, CatalogOrder, ChapterData, Collection, Entity, MangaData, PageQuality,
};
use crate::config::SyncConfig;

/// Relationship types expanded on every title request.
const MANGA_INCLUDES: [&str; 3] = ["cover_art", "author", "artist"];

/// Client for the MangaDex REST API.
///
/// Create once and share; the limiter inside is the single budget for every
/// request this client issues.
#[derive(Debug, Clone)]
pub struct MangaDexClient {
    transport: Arc<dyn Transport>,
    base_url: Url,
    limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
    rate_limit_fallback: Duration,
    max_rate_limit_waits: u32,
}

impl MangaDexClient {
    /// Creates a client with the default transport, limiter and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] for a malformed base URL and
    /// [`ApiError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_transport(Arc::new(ReqwestTransport::new()?), base_url)
    }

    /// Creates a client over an explicit transport.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] for a malformed base URL.
    pub fn with_transport(transport: Arc<dyn Transport>, base_url: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url).map_err(|_| ApiError::invalid_url(base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::invalid_url(base_url.as_str()));
        }
        Ok(Self {
            transport,
            base_url,
            limiter: Arc::new(RateLimiter::default()),
            retry_policy: RetryPolicy::default(),
            rate_limit_fallback: DEFAULT_RATE_LIMIT_FALLBACK,
            max_rate_limit_waits: DEFAULT_MAX_RATE_LIMIT_WAITS,
        })
    }

    /// Builds a client from the sync configuration.
    ///
    /// # Errors
    ///
    /// Same as [`MangaDexClient::new`].
    #[instrument(skip(config), fields(base_url = %config.base_url))]
    pub fn from_config(config: &SyncConfig) -> Result<Self, ApiError> {
        let transport =
            ReqwestTransport::with_timeouts(config.connect_timeout, config.request_timeout)?;
        Ok(Self::with_transport(Arc::new(transport), &config.base_url)?
            .with_rate_limiter(Arc::new(RateLimiter::new(
                config.general_budget,
                config.page_server_budget,
            )))
            .with_retry_policy(config.retry_policy())
            .with_rate_limit_fallback(config.rate_limit_fallback)
            .with_max_rate_limit_waits(config.max_rate_limit_waits))
    }

    /// Replaces the rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Replaces the retry policy for transient failures.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets the wait used for a 429 without a usable Retry-After header.
    #[must_use]
    pub fn with_rate_limit_fallback(mut self, fallback: Duration) -> Self {
        self.rate_limit_fallback = fallback;
        self
    }

    /// Sets how many consecutive 429 responses one call waits out.
    #[must_use]
    pub fn with_max_rate_limit_waits(mut self, waits: u32) -> Self {
        self.max_rate_limit_waits = waits;
        self
    }

    /// The shared rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The API base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Lists titles ordered by follower count.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the last attempt.
    pub async fn list_manga(
        &self,
        offset: u32,
        limit: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<Collection<MangaData>, ApiError> {
        self.list_manga_by(CatalogOrder::Popular, offset, limit, cancel).await
    }

    /// Lists titles, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the last attempt.
    pub async fn list_updated_manga(
        &self,
        offset: u32,
        limit: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<Collection<MangaData>, ApiError> {
        self.list_manga_by(CatalogOrder::RecentlyUpdated, offset, limit, cancel).await
    }

    /// Lists one page of titles in `order`, with covers, authors and artists.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the last attempt.
    #[instrument(skip(self, cancel), fields(order = %order))]
    pub async fn list_manga_by(
        &self,
        order: CatalogOrder,
        offset: u32,
        limit: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<Collection<MangaData>, ApiError> {
        let mut url = self.endpoint(&["manga"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("limit", &limit.to_string())
                .append_pair("offset", &offset.to_string());
            for include in MANGA_INCLUDES {
                query.append_pair("includes[]", include);
            }
            let (key, direction) = order.query_pair();
            query.append_pair(key, direction);
        }
        let url = &url;
        with_retry(&self.retry_policy, "list_manga", move || {
            self.call(EndpointClass::General, url, cancel)
        })
        .await
    }

    /// Fetches one title with its cover, authors and artists.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the last attempt.
    #[instrument(skip(self, cancel))]
    pub async fn get_manga(
        &self,
        manga_id: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<MangaData, ApiError> {
        let mut url = self.endpoint(&["manga", manga_id])?;
        {
            let mut query = url.query_pairs_mut();
            for include in MANGA_INCLUDES {
                query.append_pair("includes[]", include);
            }
        }
        let url = &url;
        let entity: Entity<MangaData> = with_retry(&self.retry_policy, "get_manga", move || {
            self.call(EndpointClass::General, url, cancel)
        })
        .await?;
        Ok(entity.data)
    }

    /// Fetches every English chapter of a title in ascending chapter order.
    ///
    /// Walks the feed in pages of [`CHAPTER_FEED_PAGE_SIZE`] until a short page.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the first page that could not be fetched.
    #[instrument(skip(self, cancel))]
    pub async fn chapter_feed(
        &self,
        manga_id: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<ChapterData>, ApiError> {
        let mut chapters = Vec::new();
        let mut offset = 0u32;

        loop {
            let mut url = self.endpoint(&["manga", manga_id, "feed"])?;
            url.query_pairs_mut()
                .append_pair("limit", &CHAPTER_FEED_PAGE_SIZE.to_string())
                .append_pair("offset", &offset.to_string())
                .append_pair("translatedLanguage[]", "en")
                .append_pair("order[chapter]", "asc");
            let url = &url;

            let page: Collection<ChapterData> =
                with_retry(&self.retry_policy, "chapter_feed", move || {
                    self.call(EndpointClass::General, url, cancel)
                })
                .await?;

            let received = u32::try_from(page.data.len()).unwrap_or(u32::MAX);
            chapters.extend(page.data);
            offset = offset.saturating_add(received);

            if received < CHAPTER_FEED_PAGE_SIZE || page.total.is_some_and(|t| offset >= t) {
                break;
            }
        }

        debug!(chapters = chapters.len(), "chapter feed complete");
        Ok(chapters)
    }

    /// Fetches the page-server manifest of a chapter.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the last attempt.
    #[instrument(skip(self, cancel))]
    pub async fn page_manifest(
        &self,
        chapter_id: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<AtHomeResponse, ApiError> {
        let url = self.endpoint(&["at-home", "server", chapter_id])?;
        let url = &url;
        with_retry(&self.retry_policy, "page_manifest", move || {
            self.call(EndpointClass::PageServer, url, cancel)
        })
        .await
    }

    /// Resolves the ordered page image URLs of a chapter.
    ///
    /// # Errors
    ///
    /// Same as [`MangaDexClient::page_manifest`].
    pub async fn chapter_pages(
        &self,
        chapter_id: &str,
        quality: PageQuality,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<String>, ApiError> {
        let manifest = self.page_manifest(chapter_id, cancel).await?;
        Ok(manifest.page_urls(quality))
    }

    /// Issues one GET through the limiter of `class` and decodes the body.
    ///
    /// The limiter permit is held until the body has been read. A 429
    /// response is waited out and re-issued up to `max_rate_limit_waits`
    /// times. This does not retry network failures.
    ///
    /// # Errors
    ///
    /// - [`ApiError::HttpStatus`] for non-2xx responses (including a 429 past the wait limit)
    /// - [`ApiError::Api`] when the body reports `"result": "error"`
    /// - [`ApiError::Decode`] when the body does not match `T`
    /// - transport errors unchanged
    #[instrument(skip(self, cancel), fields(class = %class, url = %url))]
    pub async fn call<T: DeserializeOwned>(
        &self,
        class: EndpointClass,
        url: &Url,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, ApiError> {
        let mut rate_limit_waits = 0u32;

        loop {
            let permit = self.limiter.acquire(class).await?;
            let response = self.transport.get(url, cancel).await?;
            drop(permit);

            self.limiter.record_quota(
                class,
                QuotaHint::from_headers(&response.headers, SystemTime::now()),
            );

            if response.status == 429 {
                let retry_after = response.header(RETRY_AFTER.as_str()).map(str::to_string);
                if rate_limit_waits >= self.max_rate_limit_waits {
                    warn!(
                        waits = rate_limit_waits,
                        "still rate limited after maximum waits - giving up"
                    );
                    return Err(ApiError::http_status_with_retry_after(
                        url.as_str(),
                        429,
                        retry_after,
                    ));
                }
                rate_limit_waits += 1;

                let delay = retry_after
                    .as_deref()
                    .and_then(parse_retry_after)
                    .unwrap_or(self.rate_limit_fallback);
                self.limiter.record_rate_limit(class, delay);
                warn!(
                    delay_ms = delay.as_millis(),
                    wait = rate_limit_waits,
                    "rate limit exceeded, waiting before re-issuing"
                );
                sleep_or_cancel(delay, url, cancel).await?;
                continue;
            }

            if !response.is_success() {
                debug!(status = response.status, "non-success status");
                return Err(ApiError::http_status(url.as_str(), response.status));
            }

            return decode_body(url, &response);
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::invalid_url(self.base_url.as_str()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl CatalogSource for MangaDexClient {
    async fn fetch_page(
        &self,
        order: CatalogOrder,
        offset: u32,
        limit: u32,
    ) -> Result<Collection<MangaData>, ApiError> {
        self.list_manga_by(order, offset, limit, None).await
    }

    async fn fetch_item(&self, external_id: &str) -> Result<MangaData, ApiError> {
        self.get_manga(external_id, None).await
    }

    async fn fetch_chapters(&self, external_id: &str) -> Result<Vec<ChapterData>, ApiError> {
        self.chapter_feed(external_id, None).await
    }

    async fn fetch_pages(
        &self,
        chapter_id: &str,
        quality: PageQuality,
    ) -> Result<Vec<String>, ApiError> {
        self.chapter_pages(chapter_id, quality, None).await
    }
}

async fn sleep_or_cancel(
    delay: Duration,
    url: &Url,
    cancel: Option<&CancellationToken>,
) -> Result<(), ApiError> {
    match cancel {
        Some(token) => {
            tokio::select! {
                () = token.cancelled() => Err(ApiError::cancelled(url.as_str())),
                () = tokio::time::sleep(delay) => Ok(()),
            }
        }
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}

fn decode_body<T: DeserializeOwned>(url: &Url, response: &TransportResponse) -> Result<T, ApiError> {
    let value: Value = serde_json::from_slice(&response.body)
        .map_err(|source| ApiError::decode(url.as_str(), source))?;

    if value.get("result").and_then(Value::as_str) == Some("error") {
        let detail = value
            .get("errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
            .and_then(|first| first.get("detail").or_else(|| first.get("title")))
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        warn!(url = %url, detail, "API reported an error result");
        return Err(ApiError::api(url.as_str(), detail));
    }

    serde_json::from_value(value).map_err(|source| ApiError::decode(url.as_str(), source))
}
