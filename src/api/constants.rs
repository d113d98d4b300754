//! Constants for the MangaDex API layer (endpoints, timeouts, rate limiting).

use std::time::Duration;

/// Public MangaDex API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.mangadex.org";

/// Base URL for cover images; covers live at `{COVER_BASE_URL}/{manga_id}/{file_name}`.
pub const COVER_BASE_URL: &str = "https://uploads.mangadex.org/covers";

/// Cover used when a title has no `cover_art` relationship.
pub const PLACEHOLDER_COVER_URL: &str = "https://placeholder.moe/i/500x700.png?text=No+Cover";

/// User-Agent sent with every request. MangaDex rejects requests without one.
pub const USER_AGENT: &str = concat!("manga-sync/", env!("CARGO_PKG_VERSION"));

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default whole-request timeout (20 seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 20;

/// Page size used when walking a chapter feed. The API caps feeds at 500,
/// but 100 keeps individual responses small.
pub const CHAPTER_FEED_PAGE_SIZE: u32 = 100;

/// Delay applied to a 429 response that carries no Retry-After header.
pub const DEFAULT_RATE_LIMIT_FALLBACK: Duration = Duration::from_secs(60);

/// Number of consecutive 429 responses tolerated for one call before giving up.
pub const DEFAULT_MAX_RATE_LIMIT_WAITS: u32 = 5;

/// Warning threshold for cumulative rate limit delay per endpoint class (30 seconds).
pub const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Remaining-quota header sent by MangaDex.
pub const HEADER_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Epoch-seconds timestamp at which the quota window resets.
pub const HEADER_RATELIMIT_RETRY_AFTER: &str = "x-ratelimit-retry-after";

/// Older spelling of the reset header, still honoured when present.
pub const HEADER_RATELIMIT_RESET: &str = "x-ratelimit-reset";
