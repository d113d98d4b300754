//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use manga_sync_core::{PageQuality, RefreshPolicy};

/// Sync the MangaDex catalog into a local database.
///
/// Walks popular (or recently updated) titles page by page, stores their
/// metadata and chapters and resolves page image URLs, staying inside
/// MangaDex's rate limits.
#[derive(Parser, Debug)]
#[command(name = "manga-sync")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub overrides: SyncOverrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Titles synced by `sync --updated` when `--limit` is not given.
pub const DEFAULT_UPDATED_LIMIT: u32 = 10;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sync the whole catalog, or only recently updated titles with --updated
    Sync(SyncArgs),
    /// Re-ingest a single title by its MangaDex id
    Retry {
        /// MangaDex manga id (UUID)
        manga_id: String,
    },
}

/// Options of the `sync` subcommand.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncArgs {
    /// Sync recently updated titles instead of the whole catalog
    #[arg(long)]
    pub updated: bool,

    /// Updated titles to skip, newest first
    #[arg(long, requires = "updated", value_name = "N")]
    pub offset: Option<u32>,

    /// Updated titles to sync (1-1000)
    #[arg(long, requires = "updated", value_name = "N", value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub limit: Option<u32>,
}

impl SyncArgs {
    /// The `(offset, limit)` window of an updated-titles pass, if requested.
    #[must_use]
    pub fn updated_window(&self) -> Option<(u32, u32)> {
        self.updated.then(|| {
            (
                self.offset.unwrap_or(0),
                self.limit.unwrap_or(DEFAULT_UPDATED_LIMIT),
            )
        })
    }
}

/// Settings that override the config file for this invocation.
#[derive(Args, Debug, Clone, Default)]
pub struct SyncOverrides {
    /// SQLite database file
    #[arg(long = "db", global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// MangaDex API base URL
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Titles requested per catalog page (1-100)
    #[arg(short = 'b', long, global = true, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub batch_size: Option<u32>,

    /// Titles processed concurrently within a page (1-50)
    #[arg(short = 'c', long, global = true, value_parser = clap::value_parser!(u16).range(1..=50))]
    pub concurrency: Option<u16>,

    /// Pause between catalog pages in milliseconds (max 600000)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(0..=600_000))]
    pub batch_delay_ms: Option<u64>,

    /// Retries for transient network failures (0-10)
    #[arg(short = 'r', long, global = true, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: Option<u32>,

    /// Page image quality: data or data-saver
    #[arg(long, global = true, value_name = "QUALITY")]
    pub quality: Option<PageQuality>,

    /// Which chapters get pages fetched: missing-or-unloaded or missing-only
    #[arg(long, global = true, value_name = "POLICY")]
    pub refresh_policy: Option<RefreshPolicy>,

    /// Disable the progress display
    #[arg(long, global = true)]
    pub no_progress: bool,
}
