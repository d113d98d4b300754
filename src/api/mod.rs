//! MangaDex API access: rate-limited client, retry wrapper and wire types.
//!
//! # Example
//!
//! ```no_run
//! use manga_sync_core::api::{MangaDexClient, PageQuality};
//!
//! # async fn example() -> Result<(), manga_sync_core::api::ApiError> {
//! let client = MangaDexClient::new("https://api.mangadex.org")?;
//! let chapters = client.chapter_feed("a1c7c817-4e59-43b7-9365-09675a149a6f", None).await?;
//! if let Some(first) = chapters.first() {
//!     let pages = client.chapter_pages(&first.id, PageQuality::DataSaver, None).await?;
//!     println!("{} pages", pages.len());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod rate_limiter;
mod retry;
mod source;
mod transport;
mod types;

pub use client::MangaDexClient;
pub use constants::{
    CHAPTER_FEED_PAGE_SIZE, CONNECT_TIMEOUT_SECS, COVER_BASE_URL, DEFAULT_BASE_URL,
    DEFAULT_MAX_RATE_LIMIT_WAITS, DEFAULT_RATE_LIMIT_FALLBACK, PLACEHOLDER_COVER_URL,
    REQUEST_TIMEOUT_SECS, USER_AGENT,
};
pub use error::ApiError;
pub use rate_limiter::{
    ClassBudget, EndpointClass, QuotaHint, RateLimiter, RatePermit, parse_retry_after,
};
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error, with_retry,
};
pub use source::CatalogSource;
pub use transport::{ReqwestTransport, Transport, TransportResponse};
pub use types::{
    AtHomeChapter, AtHomeResponse, CatalogOrder, ChapterAttributes, ChapterData, Collection,
    Entity, LocaleMap, MangaAttributes, MangaData, PageQuality, Relationship,
    RelationshipAttributes, Tag, TagAttributes,
};
