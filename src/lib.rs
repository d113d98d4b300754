//! Manga Sync Core Library
//!
//! Ingests titles, chapters and page-image URLs from the MangaDex API into a
//! local `SQLite` catalog under MangaDex's rate limits.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`api`] - Rate-limited MangaDex client, retry wrapper and wire types
//! - [`catalog`] - Stored item types, the storage seam and the API mapper
//! - [`config`] - Tunables with defaults and validation
//! - [`db`] - Database connection lifecycle and schema management
//! - [`sync`] - Batch loader and progress reporting

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod sync;

// Re-export commonly used types
pub use api::{
    ApiError, CatalogOrder, CatalogSource, EndpointClass, FailureType, MangaDexClient,
    PageQuality, RateLimiter, RetryDecision, RetryPolicy, classify_error,
};
pub use catalog::{
    CatalogItem, CatalogMapper, CatalogStore, Chapter, RefreshPolicy, SqliteCatalogStore,
    StoreError,
};
pub use config::{ConfigError, SyncConfig};
pub use db::{Database, DbError};
pub use sync::{
    BatchLoader, ItemOutcome, LoaderState, ProgressHub, ProgressSnapshot, RunSummary,
    Subscription, SyncError,
};
