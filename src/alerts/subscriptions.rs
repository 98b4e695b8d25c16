use std::{collections::BTreeSet, sync::Arc};

use tokio::sync::RwLock;

/// Chat ids that asked for alerts. Lives in memory only, so a restart
/// clears it.
///
/// Shared between the tick loop (readers) and the chat command task
/// (writer).
#[derive(Clone, Default)]
pub struct Subscribers {
    inner: Arc<RwLock<BTreeSet<i64>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `chat_id` was already subscribed.
    pub async fn subscribe(&self, chat_id: i64) -> bool {
        self.inner.write().await.insert(chat_id)
    }

    /// Returns `false` if `chat_id` was not subscribed.
    pub async fn unsubscribe(&self, chat_id: i64) -> bool {
        self.inner.write().await.remove(&chat_id)
    }

    pub async fn contains(&self, chat_id: i64) -> bool {
        self.inner.read().await.contains(&chat_id)
    }

    /// Snapshot of the current recipients, in ascending id order.
    pub async fn list(&self) -> Vec<i64> {
        self.inner.read().await.iter().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
