//! Progress counters and the subscriber registry they are published to.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

/// Snapshots buffered per subscriber before newer ones are dropped.
const SUBSCRIBER_BUFFER: usize = 64;

/// Point-in-time view of a sync run.
///
/// Serializes as `{current, total, isLoading, loadedCount, failedCount, lastError}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Catalog offset reached.
    pub current: u64,
    /// Largest offset seen so far.
    pub total: u64,
    pub is_loading: bool,
    /// Items whose item-level save succeeded.
    pub loaded_count: u64,
    /// Item and chapter failures.
    pub failed_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Publish/subscribe registry for [`ProgressSnapshot`]s.
///
/// Delivery is best-effort: a subscriber whose buffer is full misses
/// snapshots until it catches up, and closed subscribers are pruned on the
/// next publish.
#[derive(Debug, Clone, Default)]
pub struct ProgressHub {
    inner: Arc<HubInner>,
}

#[derive(Debug, Default)]
struct HubInner {
    next_id: AtomicU64,
    subscribers: DashMap<u64, mpsc::Sender<ProgressSnapshot>>,
}

impl ProgressHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber.
    ///
    /// The subscription stays registered until it is dropped or
    /// [`Subscription::unsubscribe`] is called.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.inner.subscribers.insert(id, sender);
        trace!(subscriber = id, "progress subscriber added");
        Subscription {
            id,
            hub: Arc::clone(&self.inner),
            receiver,
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Sends `snapshot` to every subscriber.
    pub fn publish(&self, snapshot: &ProgressSnapshot) {
        self.inner.subscribers.retain(|id, sender| {
            match sender.try_send(snapshot.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(subscriber = *id, "progress subscriber lagging, snapshot dropped");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

/// A registered progress subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    hub: Arc<HubInner>,
    receiver: mpsc::Receiver<ProgressSnapshot>,
}

impl Subscription {
    /// Waits for the next snapshot. Returns `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<ProgressSnapshot> {
        self.receiver.recv().await
    }

    /// Returns a buffered snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<ProgressSnapshot> {
        self.receiver.try_recv().ok()
    }

    /// Removes this subscriber from the hub.
    ///
    /// Snapshots already buffered can still be received.
    pub fn unsubscribe(&mut self) {
        if self.hub.subscribers.remove(&self.id).is_some() {
            trace!(subscriber = self.id, "progress subscriber removed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
