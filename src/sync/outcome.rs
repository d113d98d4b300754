//! Typed results of a sync run and its units of work.

use thiserror::Error;

use crate::api::ApiError;
use crate::catalog::StoreError;

/// Errors that stop a sync run or a single-item retry.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another run is in flight on this loader.
    #[error("sync already in progress")]
    AlreadyRunning,

    /// The catalog page at `offset` failed too many times in a row.
    #[error("catalog page at offset {offset} failed {attempts} times: {last_error}")]
    PageRetriesExhausted {
        offset: u32,
        attempts: u32,
        last_error: String,
    },

    /// Storage failure outside of per-item isolation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Remote failure outside of per-item isolation.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// A chapter whose pages could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterFailure {
    pub chapter_id: String,
    pub message: String,
}

/// Result of ingesting one catalog item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub external_id: String,
    /// True when the item was stored for the first time.
    pub created: bool,
    /// Chapters stored for the item after the upsert.
    pub chapters_total: usize,
    /// Chapters whose pages were loaded during this ingestion.
    pub chapters_loaded: usize,
    pub chapter_failures: Vec<ChapterFailure>,
}

impl ItemOutcome {
    /// True when every selected chapter loaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.chapter_failures.is_empty()
    }
}

/// An item whose ingestion failed before its item-level save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub external_id: String,
    pub message: String,
}

/// Totals of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Catalog pages processed.
    pub pages: u32,
    /// Items saved.
    pub loaded: u64,
    /// Item and chapter failures.
    pub failed: u64,
    pub item_failures: Vec<ItemFailure>,
}
