use std::{
    num::NonZeroUsize,
    sync::{Mutex, MutexGuard},
};

use lru::LruCache;

/// Bounded block-number → block-timestamp cache shared by all subscriptions
/// of one stream.
///
/// Keys are block numbers in decimal form. Failed lookups are never stored,
/// so a miss that could not be resolved stays a miss. Concurrent fills for
/// the same block are allowed to race and the last successful write wins;
/// the redundant header fetch is idempotent and cheap.
#[derive(Debug)]
pub struct BlockTimestampCache {
    inner: Mutex<LruCache<String, u64>>,
}

impl BlockTimestampCache {
    /// Create a cache bounded at `capacity` entries (minimum one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { inner: Mutex::new(LruCache::new(capacity)) }
    }

    /// Look up a block's timestamp, refreshing its recency on a hit.
    #[must_use]
    pub fn get(&self, block_number: &str) -> Option<u64> {
        self.lock().get(block_number).copied()
    }

    /// Record a block's timestamp, evicting the least-recently-used entry
    /// when at capacity.
    pub fn put(&self, block_number: String, timestamp: u64) {
        self.lock().put(block_number, timestamp);
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, u64>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
