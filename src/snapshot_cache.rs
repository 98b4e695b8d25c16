use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::Snapshot;

/// The most recent tick's `Snapshot`, shared with the chat command task and
/// the status API.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Only the tick
/// loop writes.
#[derive(Clone, Default)]
pub struct SnapshotCache {
    inner: Arc<RwLock<Option<Snapshot>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached snapshot.
    pub async fn update(&self, snapshot: Snapshot) {
        *self.inner.write().await = Some(snapshot);
    }

    /// The latest snapshot, or `None` before the first tick.
    pub async fn latest(&self) -> Option<Snapshot> {
        self.inner.read().await.clone()
    }
}
