//! Progress UI (spinner) for sync runs.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use manga_sync_core::{ProgressSnapshot, Subscription};
use tokio_util::sync::CancellationToken;

/// Spawns the progress UI fed by `subscription` when requested.
/// Returns (handle, stop) so the caller can cancel `stop` and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already cancelled.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    subscription: Subscription,
) -> (Option<tokio::task::JoinHandle<()>>, CancellationToken) {
    let stop = CancellationToken::new();
    if !use_spinner {
        stop.cancel();
        return (None, stop);
    }
    let handle = tokio::spawn(render(subscription, stop.clone()));
    (Some(handle), stop)
}

async fn render(mut subscription: Subscription, stop: CancellationToken) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Starting sync...");

    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            snapshot = subscription.recv() => match snapshot {
                Some(snapshot) => spinner.set_message(format_snapshot(&snapshot)),
                None => break,
            },
        }
    }

    spinner.finish_and_clear();
}

/// One-line status text for a snapshot.
pub(crate) fn format_snapshot(snapshot: &ProgressSnapshot) -> String {
    let mut line = format!(
        "[offset {}] {} loaded, {} failed",
        snapshot.current, snapshot.loaded_count, snapshot.failed_count
    );
    if let Some(error) = &snapshot.last_error {
        line.push_str(" | last error: ");
        line.push_str(error);
    }
    line
}
