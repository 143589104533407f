//! Per-channel delivery locks. At most one delivery runs in a channel at a time.

use std::collections::HashMap;
use std::sync::Arc;

use pullfeed_core::ChannelId;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Lazily populated map of channel → lock. Entries are never removed; a lock
/// costs a few bytes per channel ever delivered to.
#[derive(Default)]
pub struct ChannelLocks {
    locks: RwLock<HashMap<ChannelId, Arc<Mutex<()>>>>,
}

impl ChannelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `channel`. The guard releases on drop.
    pub async fn acquire(&self, channel: ChannelId) -> OwnedMutexGuard<()> {
        self.lock_for(channel).await.lock_owned().await
    }

    async fn lock_for(&self, channel: ChannelId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(&channel) {
            return lock.clone();
        }
        // Another task may have inserted between the two locks.
        self.locks
            .write()
            .await
            .entry(channel)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
