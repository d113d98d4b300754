//! Per-endpoint-class rate limiting for MangaDex requests.
//!
//! This module provides the [`RateLimiter`] struct which enforces, for each
//! [`EndpointClass`]:
//!
//! - a steady-state budget of `requests_per_window` request starts per `window`
//! - at most `max_concurrent` requests in flight
//! - a minimum spacing between two request starts
//! - a server-advertised pause when the last response reported zero remaining quota
//!
//! # Overview
//!
//! The page-manifest endpoint (`/at-home/server/{id}`) has a much tighter
//! budget than the rest of the API, so it gets its own class. Requests in
//! different classes never wait for each other.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use manga_sync_core::api::{EndpointClass, RateLimiter};
//!
//! # async fn example() -> Result<(), manga_sync_core::api::ApiError> {
//! let limiter = Arc::new(RateLimiter::default());
//!
//! // Holds one in-flight slot of the general class until dropped.
//! let permit = limiter.acquire(EndpointClass::General).await?;
//! // ... send the request
//! drop(permit);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::HeaderMap;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::constants::{
    CUMULATIVE_DELAY_WARNING_THRESHOLD, HEADER_RATELIMIT_REMAINING, HEADER_RATELIMIT_RESET,
    HEADER_RATELIMIT_RETRY_AFTER, MAX_RETRY_AFTER,
};
use super::error::ApiError;

/// Named bucket of remote calls sharing one rate-limit budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// Catalog listing, title details, chapter feeds.
    General,
    /// The `/at-home/server/{chapter}` page-manifest endpoint.
    PageServer,
}

impl EndpointClass {
    /// Returns the label used in logs and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::PageServer => "page-server",
        }
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Budget for one endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassBudget {
    /// Request starts allowed per `window`.
    pub requests_per_window: u32,
    /// Length of the refill window.
    pub window: Duration,
    /// Maximum requests in flight at once.
    pub max_concurrent: usize,
    /// Minimum time between two request starts.
    pub min_spacing: Duration,
}

impl ClassBudget {
    /// Budget for general endpoints: 80 per minute, 5 concurrent, 750ms apart.
    #[must_use]
    pub const fn general() -> Self {
        Self {
            requests_per_window: 80,
            window: Duration::from_secs(60),
            max_concurrent: 5,
            min_spacing: Duration::from_millis(750),
        }
    }

    /// Budget for the page server: 40 per minute, one at a time, 1.5s apart.
    #[must_use]
    pub const fn page_server() -> Self {
        Self {
            requests_per_window: 40,
            window: Duration::from_secs(60),
            max_concurrent: 1,
            min_spacing: Duration::from_millis(1500),
        }
    }

    fn normalized(self) -> Self {
        Self {
            requests_per_window: self.requests_per_window.max(1),
            max_concurrent: self.max_concurrent.max(1),
            ..self
        }
    }
}

/// Server-advertised quota state read from response headers.
///
/// Both fields are best-effort; `None` means the server did not say.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaHint {
    /// Requests remaining in the current server window.
    pub remaining: Option<u32>,
    /// Time until the server window resets.
    pub reset_in: Option<Duration>,
}

impl QuotaHint {
    /// Reads `x-ratelimit-remaining` and `x-ratelimit-retry-after`
    /// (or `x-ratelimit-reset`) from a response.
    ///
    /// The reset headers carry an epoch-seconds timestamp; `now` is the
    /// reference point used to turn it into a duration.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, now: SystemTime) -> Self {
        let header_str = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
        };

        let remaining = header_str(HEADER_RATELIMIT_REMAINING).and_then(|v| v.parse::<u32>().ok());

        let reset_in = header_str(HEADER_RATELIMIT_RETRY_AFTER)
            .or_else(|| header_str(HEADER_RATELIMIT_RESET))
            .and_then(|v| v.parse::<u64>().ok())
            .map(|epoch_secs| UNIX_EPOCH + Duration::from_secs(epoch_secs))
            .map(|reset_at| {
                reset_at
                    .duration_since(now)
                    .unwrap_or(Duration::ZERO)
                    .min(MAX_RETRY_AFTER)
            });

        Self {
            remaining,
            reset_in,
        }
    }

    /// Returns true when the server reported an exhausted quota.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Proof that a request slot was granted. Dropping it frees the in-flight slot.
#[derive(Debug)]
#[must_use = "dropping the permit immediately releases the in-flight slot"]
pub struct RatePermit {
    class: EndpointClass,
    _permit: Option<OwnedSemaphorePermit>,
}

impl RatePermit {
    /// Endpoint class this permit belongs to.
    #[must_use]
    pub fn class(&self) -> EndpointClass {
        self.class
    }
}

/// Per-endpoint-class rate limiter.
///
/// Owned by the API client and shared via `Arc`. Each class has exactly one
/// limiter instance, so every call of that class shares one budget.
///
/// # Thread Safety
///
/// `RateLimiter` is `Send + Sync`. Scheduling state sits behind a
/// `tokio::sync::Mutex` so a waiting caller holds the lock across its sleep,
/// which keeps request starts in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    /// Whether rate limiting is disabled (tests, local mirrors).
    disabled: bool,
    general: ClassLimiter,
    page_server: ClassLimiter,
}

#[derive(Debug)]
struct ClassLimiter {
    class: EndpointClass,
    budget: ClassBudget,
    semaphore: Arc<Semaphore>,
    schedule: Mutex<Schedule>,
    /// Set when a response reported zero remaining quota.
    blocked_until: std::sync::Mutex<Option<Instant>>,
    /// Cumulative delay applied to this class (in milliseconds).
    cumulative_delay_ms: AtomicU64,
}

#[derive(Debug, Default)]
struct Schedule {
    last_start: Option<Instant>,
    window_start: Option<Instant>,
    used_in_window: u32,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(ClassBudget::general(), ClassBudget::page_server())
    }
}

impl RateLimiter {
    /// Creates a limiter with explicit budgets for both classes.
    #[must_use]
    #[instrument(skip_all, fields(
        general_per_window = general.requests_per_window,
        page_server_per_window = page_server.requests_per_window,
    ))]
    pub fn new(general: ClassBudget, page_server: ClassBudget) -> Self {
        debug!("creating rate limiter");
        Self {
            disabled: false,
            general: ClassLimiter::new(EndpointClass::General, general),
            page_server: ClassLimiter::new(EndpointClass::PageServer, page_server),
        }
    }

    /// Creates a disabled rate limiter that applies no delays or concurrency caps.
    #[must_use]
    #[instrument]
    pub fn disabled() -> Self {
        debug!("creating disabled rate limiter");
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    /// Returns whether rate limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the budget configured for a class.
    #[must_use]
    pub fn budget(&self, class: EndpointClass) -> ClassBudget {
        self.class_limiter(class).budget
    }

    /// Number of requests of this class currently holding a permit.
    #[must_use]
    pub fn in_flight(&self, class: EndpointClass) -> usize {
        let limiter = self.class_limiter(class);
        limiter.budget.max_concurrent - limiter.semaphore.available_permits()
    }

    /// Total delay this limiter has imposed on a class so far.
    #[must_use]
    pub fn cumulative_delay(&self, class: EndpointClass) -> Duration {
        Duration::from_millis(
            self.class_limiter(class)
                .cumulative_delay_ms
                .load(Ordering::SeqCst),
        )
    }

    /// Waits until a request of `class` may start.
    ///
    /// In order, this waits for a free in-flight slot, for a server-advertised
    /// quota reset, for the window budget to refill, and for the minimum
    /// spacing since the previous start.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::LimiterClosed`] if the class semaphore was closed.
    #[instrument(skip(self), fields(class = %class))]
    pub async fn acquire(&self, class: EndpointClass) -> Result<RatePermit, ApiError> {
        if self.disabled {
            return Ok(RatePermit {
                class,
                _permit: None,
            });
        }
        self.class_limiter(class).acquire().await
    }

    /// Records the quota state the server advertised on a response.
    ///
    /// A hint without an exhausted quota clears any previous pause.
    #[instrument(skip(self), fields(class = %class))]
    pub fn record_quota(&self, class: EndpointClass, hint: QuotaHint) {
        if self.disabled {
            return;
        }
        let limiter = self.class_limiter(class);
        let mut blocked_until = limiter
            .blocked_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match (hint.is_exhausted(), hint.reset_in) {
            (true, Some(reset_in)) if !reset_in.is_zero() => {
                debug!(
                    reset_in_ms = reset_in.as_millis(),
                    "server quota exhausted - pausing class"
                );
                *blocked_until = Some(Instant::now() + reset_in);
            }
            (true, _) => {
                debug!("server quota exhausted without reset time - ignoring");
            }
            (false, _) => {
                *blocked_until = None;
            }
        }
    }

    /// Records a server-mandated rate limit delay (from a 429 Retry-After).
    #[instrument(skip(self), fields(class = %class))]
    pub fn record_rate_limit(&self, class: EndpointClass, delay: Duration) {
        let limiter = self.class_limiter(class);
        let cumulative = limiter.add_cumulative_delay(delay);

        debug!(
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            "recorded server rate limit"
        );

        if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                class = %class,
                cumulative_delay_secs = cumulative.as_secs(),
                "excessive server rate limiting - MangaDex may be under heavy load"
            );
        }
    }

    fn class_limiter(&self, class: EndpointClass) -> &ClassLimiter {
        match class {
            EndpointClass::General => &self.general,
            EndpointClass::PageServer => &self.page_server,
        }
    }
}

impl ClassLimiter {
    fn new(class: EndpointClass, budget: ClassBudget) -> Self {
        let budget = budget.normalized();
        Self {
            class,
            budget,
            semaphore: Arc::new(Semaphore::new(budget.max_concurrent)),
            schedule: Mutex::new(Schedule::default()),
            blocked_until: std::sync::Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    async fn acquire(&self) -> Result<RatePermit, ApiError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ApiError::LimiterClosed { class: self.class })?;

        let mut schedule = self.schedule.lock().await;

        let blocked_until = self
            .blocked_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(until) = blocked_until {
            let now = Instant::now();
            if until > now {
                let delay = until - now;
                self.note_delay(delay, "waiting for server quota reset");
                tokio::time::sleep_until(until).await;
            }
        }

        let now = Instant::now();
        match schedule.window_start {
            Some(start) if now.duration_since(start) < self.budget.window => {
                if schedule.used_in_window >= self.budget.requests_per_window {
                    let refill_at = start + self.budget.window;
                    self.note_delay(refill_at - now, "window budget exhausted");
                    tokio::time::sleep_until(refill_at).await;
                    schedule.window_start = Some(Instant::now());
                    schedule.used_in_window = 0;
                }
            }
            _ => {
                schedule.window_start = Some(now);
                schedule.used_in_window = 0;
            }
        }

        if let Some(last_start) = schedule.last_start {
            let elapsed = last_start.elapsed();
            if elapsed < self.budget.min_spacing {
                let delay = self.budget.min_spacing - elapsed;
                self.note_delay(delay, "applying minimum spacing");
                tokio::time::sleep(delay).await;
            }
        }

        schedule.used_in_window += 1;
        schedule.last_start = Some(Instant::now());

        Ok(RatePermit {
            class: self.class,
            _permit: Some(permit),
        })
    }

    fn note_delay(&self, delay: Duration, reason: &'static str) {
        let cumulative = self.add_cumulative_delay(delay);
        debug!(
            class = %self.class,
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            reason,
            "delaying request"
        );
        if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                class = %self.class,
                cumulative_delay_secs = cumulative.as_secs(),
                "excessive rate limiting - consider lowering batch size or concurrency"
            );
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports two formats as per RFC 7231:
/// - Integer seconds: `Retry-After: 120`
/// - HTTP-date: `Retry-After: Wed, 21 Oct 2025 07:28:00 GMT`
///
/// Returns `None` if the value cannot be parsed. Caps excessive values at 1 hour.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use manga_sync_core::api::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);

        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }

        return Some(duration);
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        if let Ok(duration) = datetime.duration_since(SystemTime::now()) {
            if duration > MAX_RETRY_AFTER {
                warn!(
                    delay_secs = duration.as_secs(),
                    max_secs = MAX_RETRY_AFTER.as_secs(),
                    "Retry-After date exceeds maximum, capping at 1 hour"
                );
                return Some(MAX_RETRY_AFTER);
            }
            Some(duration)
        } else {
            debug!(
                header_value,
                "Retry-After date is in the past, returning zero"
            );
            Some(Duration::ZERO)
        }
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}
