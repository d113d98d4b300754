//! Application wiring for the CLI: builds the pipeline and runs one command.

pub(crate) mod file_config;
pub(crate) mod progress_view;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use manga_sync_core::{
    BatchLoader, CatalogMapper, Database, ItemOutcome, MangaDexClient, RunSummary,
    SqliteCatalogStore, SyncConfig,
};

use crate::cli::Command;

/// Connects storage and the API client and returns an idle loader.
pub(crate) async fn build_loader(config: &SyncConfig, db_path: &Path) -> Result<BatchLoader> {
    let db = Database::connect(db_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", db_path.display()))?;
    let store = Arc::new(SqliteCatalogStore::new(Arc::new(db)));
    let client = MangaDexClient::from_config(config).context("Failed to build MangaDex client")?;
    Ok(BatchLoader::new(
        Arc::new(client),
        CatalogMapper::new(store),
        config,
    ))
}

/// Runs `command` on `loader`, rendering progress unless disabled.
pub(crate) async fn execute(loader: &BatchLoader, command: &Command, show_progress: bool) -> Result<()> {
    let (ui, stop) = progress_view::spawn_progress_ui(show_progress, loader.subscribe());

    let result = match command {
        Command::Sync(args) => {
            let run = match args.updated_window() {
                Some((offset, limit)) => loader.sync_updated(offset, limit).await,
                None => loader.run().await,
            };
            run.map(|summary| report_run(&summary)).map_err(Into::into)
        }
        Command::Retry { manga_id } => match loader.retry_item(manga_id).await {
            Ok(outcome) => {
                report_item(&outcome);
                ensure_complete(&outcome)
            }
            Err(err) => Err(err.into()),
        },
    };

    stop.cancel();
    if let Some(handle) = ui {
        let _ = handle.await;
    }

    result
}

fn report_run(summary: &RunSummary) {
    info!(
        pages = summary.pages,
        loaded = summary.loaded,
        failed = summary.failed,
        "Sync finished"
    );
    for failure in &summary.item_failures {
        warn!(manga_id = %failure.external_id, error = %failure.message, "Title failed");
    }
}

fn report_item(outcome: &ItemOutcome) {
    info!(
        manga_id = %outcome.external_id,
        created = outcome.created,
        chapters = outcome.chapters_total,
        chapters_loaded = outcome.chapters_loaded,
        "Title synced"
    );
    for failure in &outcome.chapter_failures {
        warn!(chapter_id = %failure.chapter_id, error = %failure.message, "Chapter failed");
    }
}

/// Fails with a non-zero exit when a retried title still has failing chapters.
fn ensure_complete(outcome: &ItemOutcome) -> Result<()> {
    if !outcome.is_complete() {
        bail!(
            "{} of {} chapters of {} failed to load",
            outcome.chapter_failures.len(),
            outcome.chapters_total,
            outcome.external_id
        );
    }
    Ok(())
}
