use parking_lot::Mutex;
use tracing::debug;

use super::lru::LruCache;

/// Default number of block timestamps kept in memory. Four bytes of height
/// plus four bytes of timestamp per entry keeps this near 800kB before map
/// overhead.
pub const DEFAULT_TIMESTAMP_CAPACITY: usize = 100_000;

/// Thread-safe map from block height to block timestamp (unix seconds).
///
/// Lookups refresh recency, so the mutex is taken for reads as well.
pub struct TimestampCache {
    inner: Mutex<LruCache<u32, u32>>,
}

impl TimestampCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, height: u32) -> Option<u32> {
        self.inner.lock().get(&height).copied()
    }

    /// Stores a timestamp. Returns true if another height was evicted.
    pub fn put(&self, height: u32, timestamp: u32) -> bool {
        match self.inner.lock().put(height, timestamp) {
            Some((evicted, _)) => {
                debug!("Evicted timestamp for height {} from cache", evicted);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }
}

impl Default for TimestampCache {
    fn default() -> Self {
        Self::new(DEFAULT_TIMESTAMP_CAPACITY)
    }
}
