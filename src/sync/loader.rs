//! Batch loader: walks the remote catalog and ingests every title.
//!
//! A run requests catalog pages of `batch_size` titles, ingests each page in
//! groups of `item_concurrency` titles (a group finishes before the next
//! starts), then pauses for `batch_delay`. Failures of a single title or
//! chapter are counted and logged but never stop the run; only a catalog
//! page that keeps failing does.
//!
//! [`BatchLoader::sync_updated`] walks the recently-updated listing the same
//! way, bounded to an offset and title count.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use manga_sync_core::{
//!     BatchLoader, CatalogMapper, Database, MangaDexClient, SqliteCatalogStore, SyncConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::default();
//! let db = Arc::new(Database::connect(std::path::Path::new("manga.db")).await?);
//! let mapper = CatalogMapper::new(Arc::new(SqliteCatalogStore::new(db)));
//! let client = Arc::new(MangaDexClient::from_config(&config)?);
//! let loader = BatchLoader::new(client, mapper, &config);
//!
//! let summary = loader.run().await?;
//! println!("loaded {}, failed {}", summary.loaded, summary.failed);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use super::outcome::{ChapterFailure, ItemFailure, ItemOutcome, RunSummary, SyncError};
use super::progress::{ProgressHub, ProgressSnapshot, Subscription};
use crate::api::{CatalogOrder, CatalogSource, MangaData, PageQuality};
use crate::catalog::{CatalogMapper, RefreshPolicy};
use crate::config::SyncConfig;

/// Lifecycle state of a [`BatchLoader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoaderState {
    #[default]
    Idle,
    Running,
    /// The last run stopped on a catalog page that kept failing.
    Failed,
}

impl LoaderState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct LoaderSettings {
    batch_size: u32,
    item_concurrency: usize,
    batch_delay: Duration,
    max_page_retries: u32,
    page_quality: PageQuality,
    refresh_policy: RefreshPolicy,
}

impl From<&SyncConfig> for LoaderSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            item_concurrency: config.item_concurrency.max(1),
            batch_delay: config.batch_delay,
            max_page_retries: config.max_page_retries.max(1),
            page_quality: config.page_quality,
            refresh_policy: config.refresh_policy,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    active: AtomicBool,
    state: Mutex<LoaderState>,
    progress: Mutex<ProgressSnapshot>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Orchestrates full catalog syncs and single-title retries.
///
/// At most one operation runs at a time per loader; a second call while one
/// is active fails with [`SyncError::AlreadyRunning`].
pub struct BatchLoader {
    source: Arc<dyn CatalogSource>,
    mapper: CatalogMapper,
    settings: LoaderSettings,
    hub: ProgressHub,
    shared: Shared,
}

impl fmt::Debug for BatchLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchLoader")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl BatchLoader {
    /// Creates an idle loader.
    #[must_use]
    pub fn new(source: Arc<dyn CatalogSource>, mapper: CatalogMapper, config: &SyncConfig) -> Self {
        Self {
            source,
            mapper,
            settings: LoaderSettings::from(config),
            hub: ProgressHub::new(),
            shared: Shared::default(),
        }
    }

    /// Current progress counters.
    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        lock(&self.shared.progress).clone()
    }

    #[must_use]
    pub fn state(&self) -> LoaderState {
        *lock(&self.shared.state)
    }

    /// Subscribes to progress snapshots published by this loader.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    /// The registry progress is published to.
    #[must_use]
    pub fn progress_hub(&self) -> &ProgressHub {
        &self.hub
    }

    /// Syncs the whole remote catalog, most followed titles first.
    ///
    /// Resets the progress counters, then pages through the catalog until an
    /// empty page. A catalog page that fails is retried at the same offset
    /// after twice the batch delay.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadyRunning`] if another operation is active; the
    ///   counters are left untouched
    /// - [`SyncError::PageRetriesExhausted`] once a page fails
    ///   `max_page_retries` times in a row; the loader ends in
    ///   [`LoaderState::Failed`]
    #[instrument(skip(self), fields(batch_size = self.settings.batch_size))]
    pub async fn run(&self) -> Result<RunSummary, SyncError> {
        let mut guard = self.claim(true)?;
        info!("catalog sync started");

        let summary = self.walk(&mut guard, CatalogOrder::Popular, 0, None).await?;

        info!(
            pages = summary.pages,
            loaded = summary.loaded,
            failed = summary.failed,
            "catalog sync complete"
        );
        Ok(summary)
    }

    /// Syncs at most `limit` of the most recently updated titles, skipping
    /// the first `offset` of that listing.
    ///
    /// Behaves like [`BatchLoader::run`] otherwise: counters are reset, pages
    /// of up to `batch_size` titles are ingested in groups, and a failing
    /// page is retried at the same offset.
    ///
    /// # Errors
    ///
    /// Same as [`BatchLoader::run`].
    #[instrument(skip(self))]
    pub async fn sync_updated(&self, offset: u32, limit: u32) -> Result<RunSummary, SyncError> {
        let mut guard = self.claim(true)?;
        info!("updated-titles sync started");

        let summary = self
            .walk(&mut guard, CatalogOrder::RecentlyUpdated, offset, Some(limit))
            .await?;

        info!(
            pages = summary.pages,
            loaded = summary.loaded,
            failed = summary.failed,
            "updated-titles sync complete"
        );
        Ok(summary)
    }

    /// Pages through the listing in `order` from `start` until an empty page,
    /// or until `max_items` titles have been taken.
    async fn walk(
        &self,
        guard: &mut ActiveGuard<'_>,
        order: CatalogOrder,
        start: u32,
        max_items: Option<u32>,
    ) -> Result<RunSummary, SyncError> {
        let settings = self.settings;
        let mut summary = RunSummary::default();
        let mut offset = start;
        let mut remaining = max_items;
        let mut page_failures = 0u32;

        loop {
            let limit = remaining.map_or(settings.batch_size, |left| left.min(settings.batch_size));
            if limit == 0 {
                break;
            }

            let page = match self.source.fetch_page(order, offset, limit).await {
                Ok(page) => page,
                Err(err) => {
                    page_failures += 1;
                    let message = err.to_string();
                    warn!(
                        offset,
                        attempt = page_failures,
                        max_attempts = settings.max_page_retries,
                        error = %message,
                        "catalog page failed"
                    );
                    self.update(|p| p.last_error = Some(message.clone()));

                    if page_failures >= settings.max_page_retries {
                        error!(offset, "catalog page retries exhausted, stopping sync");
                        guard.mark_failed();
                        return Err(SyncError::PageRetriesExhausted {
                            offset,
                            attempts: page_failures,
                            last_error: message,
                        });
                    }
                    tokio::time::sleep(settings.batch_delay.saturating_mul(2)).await;
                    continue;
                }
            };
            page_failures = 0;

            if page.data.is_empty() {
                break;
            }
            let items = &page.data[..page.data.len().min(limit as usize)];
            debug!(offset, items = items.len(), "processing catalog page");

            for group in items.chunks(settings.item_concurrency) {
                let results = join_all(group.iter().map(|manga| self.ingest(manga))).await;
                for (manga, result) in group.iter().zip(results) {
                    match result {
                        Ok(outcome) => {
                            summary.failed += outcome.chapter_failures.len() as u64;
                            summary.loaded += 1;
                        }
                        Err(err) => {
                            summary.failed += 1;
                            summary.item_failures.push(ItemFailure {
                                external_id: manga.id.clone(),
                                message: err.to_string(),
                            });
                        }
                    }
                }
            }

            let received = u32::try_from(items.len()).unwrap_or(u32::MAX);
            offset = offset.saturating_add(received);
            summary.pages += 1;
            self.update(|p| {
                p.current = u64::from(offset);
                p.total = p.total.max(u64::from(offset));
            });

            if let Some(left) = remaining.as_mut() {
                *left = left.saturating_sub(received);
                if *left == 0 {
                    break;
                }
            }
            tokio::time::sleep(settings.batch_delay).await;
        }

        Ok(summary)
    }

    /// Re-ingests a single title by id.
    ///
    /// Progress counters are added to, not reset.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadyRunning`] if another operation is active
    /// - [`SyncError::Api`] / [`SyncError::Store`] when the title itself
    ///   could not be fetched or saved; chapter failures are reported in the
    ///   returned [`ItemOutcome`]
    #[instrument(skip(self))]
    pub async fn retry_item(&self, external_id: &str) -> Result<ItemOutcome, SyncError> {
        let _guard = self.claim(false)?;

        let manga = match self.source.fetch_item(external_id).await {
            Ok(manga) => manga,
            Err(err) => {
                warn!(error = %err, "title fetch failed");
                self.record_failure(err.to_string());
                return Err(err.into());
            }
        };
        self.ingest(&manga).await
    }

    /// Fetches chapters, saves the title, then loads the selected chapters'
    /// pages one by one.
    #[instrument(skip(self, manga), fields(external_id = %manga.id))]
    async fn ingest(&self, manga: &MangaData) -> Result<ItemOutcome, SyncError> {
        let saved = async {
            let chapters = self.source.fetch_chapters(&manga.id).await?;
            let upsert = self.mapper.upsert_catalog_item(manga, &chapters).await?;
            Ok::<_, SyncError>(upsert)
        }
        .await;

        let upsert = match saved {
            Ok(upsert) => upsert,
            Err(err) => {
                error!(error = %err, "failed to save title");
                self.record_failure(err.to_string());
                return Err(err);
            }
        };
        self.update(|p| p.loaded_count += 1);

        let mut outcome = ItemOutcome {
            external_id: manga.id.clone(),
            created: upsert.created,
            chapters_total: upsert.item.chapters.len(),
            chapters_loaded: 0,
            chapter_failures: Vec::new(),
        };

        for chapter in upsert.chapters_needing_pages(self.settings.refresh_policy) {
            match self.load_chapter(&manga.id, &chapter.external_id).await {
                Ok(true) => outcome.chapters_loaded += 1,
                Ok(false) => {}
                Err(err) => {
                    let message = err.to_string();
                    warn!(chapter_id = %chapter.external_id, error = %message, "failed to load chapter pages");
                    self.record_failure(message.clone());
                    outcome.chapter_failures.push(ChapterFailure {
                        chapter_id: chapter.external_id.clone(),
                        message,
                    });
                }
            }
        }

        debug!(
            chapters = outcome.chapters_total,
            loaded = outcome.chapters_loaded,
            failed = outcome.chapter_failures.len(),
            "title ingested"
        );
        Ok(outcome)
    }

    /// Returns whether pages were stored; an empty page list stores nothing.
    async fn load_chapter(&self, item_id: &str, chapter_id: &str) -> Result<bool, SyncError> {
        let pages = self
            .source
            .fetch_pages(chapter_id, self.settings.page_quality)
            .await?;
        if pages.is_empty() {
            debug!(chapter_id, "chapter has no pages yet");
            return Ok(false);
        }
        self.mapper
            .save_chapter_pages(item_id, chapter_id, &pages)
            .await?;
        Ok(true)
    }

    fn record_failure(&self, message: String) {
        self.update(|p| {
            p.failed_count += 1;
            p.last_error = Some(message);
        });
    }

    /// Applies `change` to the counters and publishes the result.
    fn update(&self, change: impl FnOnce(&mut ProgressSnapshot)) {
        let snapshot = {
            let mut progress = lock(&self.shared.progress);
            change(&mut progress);
            progress.clone()
        };
        self.hub.publish(&snapshot);
    }

    fn claim(&self, full_run: bool) -> Result<ActiveGuard<'_>, SyncError> {
        if self
            .shared
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("sync already in progress");
            return Err(SyncError::AlreadyRunning);
        }

        if full_run {
            *lock(&self.shared.state) = LoaderState::Running;
        }
        self.update(|p| {
            if full_run {
                *p = ProgressSnapshot::default();
            }
            p.is_loading = true;
        });

        Ok(ActiveGuard {
            loader: self,
            full_run,
            failed: false,
        })
    }
}

/// Releases the loader when an operation ends, including when its future is
/// dropped mid-flight.
struct ActiveGuard<'a> {
    loader: &'a BatchLoader,
    full_run: bool,
    failed: bool,
}

impl ActiveGuard<'_> {
    fn mark_failed(&mut self) {
        self.failed = true;
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if self.full_run {
            *lock(&self.loader.shared.state) = if self.failed {
                LoaderState::Failed
            } else {
                LoaderState::Idle
            };
        }
        self.loader.update(|p| p.is_loading = false);
        self.loader.shared.active.store(false, Ordering::Release);
    }
}
