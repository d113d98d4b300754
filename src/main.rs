//! CLI entry point for the manga-sync tool.

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

mod app;
mod cli;

use app::file_config::{load_default_file_config, resolve_settings};
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?cli, "CLI arguments parsed");

    let loaded = load_default_file_config()?;
    if let (Some(path), Some(_)) = (&loaded.path, &loaded.config) {
        debug!(path = %path.display(), "Loaded config file");
    }
    let settings = resolve_settings(loaded.config.as_ref(), &cli.overrides)?;
    info!(db = %settings.db_path.display(), base_url = %settings.sync.base_url, "manga-sync starting");

    let loader = app::build_loader(&settings.sync, &settings.db_path).await?;
    let show_progress = !cli.quiet && !cli.overrides.no_progress;
    app::execute(&loader, &cli.command, show_progress).await
}
