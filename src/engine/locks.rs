use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-feed mutual exclusion, keyed by feed name.
///
/// Locks live here rather than on `Feed` so they are never cloned along with
/// feed data. Entries are created on first use and kept for the process
/// lifetime (one per configured feed).
pub struct FeedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>, // feed name -> lock
}

impl Default for FeedLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `feed`. Held until the guard drops.
    pub async fn lock(&self, feed: &str) -> OwnedMutexGuard<()> {
        self.entry(feed).lock_owned().await
    }

    /// Exclusive access to `feed` if nobody holds it right now.
    pub fn try_lock(&self, feed: &str) -> Option<OwnedMutexGuard<()>> {
        self.entry(feed).try_lock_owned().ok()
    }

    fn entry(&self, feed: &str) -> Arc<AsyncMutex<()>> {
        // std mutex is only held for the map lookup, never across an await
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(feed.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
