//! Bounded recency window over cache keys.
//!
//! The tracker remembers the `capacity` most recently touched keys and nothing
//! else. It holds no values: the listings live in the cache's own store, so a
//! key dropping out of the window does not free anything by itself. The cache
//! purges the stored listing the next time that key is touched.

use lru::LruCache;
use std::num::NonZeroUsize;

/// Outcome of touching a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Touch {
    /// The key was inside the window; it is now the most recent.
    Hit,
    /// The key was outside the window and has been admitted. `displaced`
    /// names the least-recent key pushed out to make room, if any.
    Miss { displaced: Option<String> },
}

/// The N most recently touched keys, with O(1) touch and evict-oldest.
#[derive(Debug)]
pub(crate) struct RecencyTracker {
    window: LruCache<String, ()>,
}

impl RecencyTracker {
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        Self {
            window: LruCache::new(capacity),
        }
    }

    /// Marks `key` as most recently used.
    pub(crate) fn touch(&mut self, key: &str) -> Touch {
        if self.window.get(key).is_some() {
            return Touch::Hit;
        }
        let displaced = self.window.push(key.to_string(), ()).map(|(k, ())| k);
        Touch::Miss { displaced }
    }

    /// Whether `key` is inside the window. Does not change its position.
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.window.contains(key)
    }

    pub(crate) fn clear(&mut self) {
        self.window.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.window.len()
    }
}
