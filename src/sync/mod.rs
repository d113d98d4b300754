//! Catalog sync orchestration and progress reporting.

mod loader;
mod outcome;
mod progress;

pub use loader::{BatchLoader, LoaderState};
pub use outcome::{ChapterFailure, ItemFailure, ItemOutcome, RunSummary, SyncError};
pub use progress::{ProgressHub, ProgressSnapshot, Subscription};
