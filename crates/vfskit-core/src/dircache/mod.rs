//! Expiring, approximately bounded cache of directory listings.
//!
//! [`DirCache`] maps a directory path to the [`Listing`] last enumerated for
//! it, so a filesystem layer can skip repeated listing calls against a slow
//! backing store. Three independent knobs control it (see
//! [`DirCacheConfig`]):
//!
//! - **enabled**: when off, `set` is a no-op and every lookup misses.
//! - **expiry**: a listing older than this is treated as absent and dropped
//!   on the read that discovers it.
//! - **max_paths**: only the `max_paths` most recently touched paths are
//!   visible.
//!
//! # Lazy eviction
//!
//! Capacity limiting is approximate. Reads and writes both *touch* a path in
//! a bounded recency window. When the window overflows, the least recently
//! touched path is forgotten by the window but its listing stays in the store.
//! The listing is only purged the next time that path is touched: a read then
//! reports [`CacheError::NotFound`], a write re-admits the path with the new
//! listing. Between those touches the store can hold more than `max_paths`
//! listings; [`DirCache::len`] reports the raw store size.
//!
//! # Example
//!
//! ```
//! use vfskit_core::{DirCache, DirCacheConfig, Entry, Listing};
//!
//! let mut cache = DirCache::new(DirCacheConfig::default().with_max_paths(2));
//! cache.set("bucket/a", Listing::new(vec![Entry::file("bucket/a/x", 1)]));
//! cache.set("bucket/b", Listing::default());
//! cache.set("bucket/c", Listing::default());
//!
//! // "bucket/a" fell out of the window; this read purges it.
//! assert!(cache.get("bucket/a").is_err());
//! assert!(cache.contains("bucket/c"));
//! ```

mod recency;

use crate::error::CacheError;
use crate::listing::Listing;
use recency::{RecencyTracker, Touch};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Construction-time options for a [`DirCache`].
///
/// Deserializes from configuration files with humantime durations:
///
/// ```
/// use vfskit_core::DirCacheConfig;
/// use std::time::Duration;
///
/// let config: DirCacheConfig =
///     serde_json::from_str(r#"{"expiry": "30s", "max_paths": 128}"#).unwrap();
/// assert!(config.enabled);
/// assert_eq!(config.expiry, Some(Duration::from_secs(30)));
/// assert_eq!(config.max_paths, Some(128));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirCacheConfig {
    /// If false, the cache never stores anything.
    pub enabled: bool,
    /// How long a listing stays valid after it was written. `None` disables
    /// expiry.
    #[serde(with = "humantime_serde")]
    pub expiry: Option<Duration>,
    /// Size of the recency window. `None` or `Some(0)` disables capacity
    /// limiting.
    pub max_paths: Option<usize>,
}

impl Default for DirCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiry: None,
            max_paths: None,
        }
    }
}

impl DirCacheConfig {
    /// A configuration whose cache never holds anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Sets the expiry from fractional seconds.
    ///
    /// Negative, NaN or overflowing values are clamped to zero (every listing
    /// expires as soon as any time passes).
    #[must_use]
    pub fn with_expiry_secs(self, secs: f64) -> Self {
        let expiry = Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO);
        self.with_expiry(expiry)
    }

    #[must_use]
    pub fn with_max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = Some(max_paths);
        self
    }
}

/// Counters describing cache behaviour since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirCacheStats {
    /// Reads that returned a listing.
    pub hits: u64,
    /// Reads that reported `NotFound`.
    pub misses: u64,
    /// Listings dropped because they outlived the expiry.
    pub expired: u64,
    /// Listings purged because their path had left the recency window.
    pub evicted: u64,
}

impl DirCacheStats {
    /// Fraction of reads that hit, or 0.0 when there were no reads.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cache of directory listings keyed by path.
///
/// Single-owner: every operation that can observe visibility takes
/// `&mut self`, since reads may purge expired or evicted listings. Share it
/// behind a lock if several threads need it.
#[derive(Debug)]
pub struct DirCache {
    config: DirCacheConfig,
    store: HashMap<String, Listing>,
    /// Last write time per path. Only maintained when expiry is enabled.
    touched_at: HashMap<String, Instant>,
    /// Only present when capacity limiting is enabled.
    recency: Option<RecencyTracker>,
    stats: DirCacheStats,
}

impl Default for DirCache {
    fn default() -> Self {
        Self::new(DirCacheConfig::default())
    }
}

impl DirCache {
    pub fn new(config: DirCacheConfig) -> Self {
        let recency = config
            .max_paths
            .and_then(NonZeroUsize::new)
            .map(RecencyTracker::new);
        Self {
            config,
            store: HashMap::new(),
            touched_at: HashMap::new(),
            recency,
            stats: DirCacheStats::default(),
        }
    }

    pub fn config(&self) -> &DirCacheConfig {
        &self.config
    }

    pub fn stats(&self) -> DirCacheStats {
        self.stats
    }

    /// Returns the cached listing for `path`.
    ///
    /// Fails with [`CacheError::NotFound`] if the path was never set, its
    /// listing has expired, or it is outside the recency window. Expired and
    /// out-of-window listings are removed from the store by this call.
    pub fn get(&mut self, path: &str) -> Result<&Listing, CacheError> {
        if self.is_expired(path) {
            self.store.remove(path);
            self.touched_at.remove(path);
            self.stats.expired += 1;
            tracing::debug!(path, "Directory listing expired");
        }

        if self.touch(path) && self.store.remove(path).is_some() {
            self.touched_at.remove(path);
            self.stats.evicted += 1;
            tracing::debug!(path, "Purged listing outside recency window");
        }

        if self.store.contains_key(path) {
            self.stats.hits += 1;
            tracing::trace!(path, "Listing cache hit");
        } else {
            self.stats.misses += 1;
            tracing::trace!(path, "Listing cache miss");
        }
        self.store
            .get(path)
            .ok_or_else(|| CacheError::not_found(path))
    }

    /// Stores `listing` for `path`, replacing any previous listing.
    ///
    /// Does nothing when the cache is disabled.
    pub fn set(&mut self, path: impl Into<String>, listing: Listing) {
        if !self.config.enabled {
            return;
        }
        let path = path.into();
        // A write to a path outside the window re-admits it.
        self.touch(&path);
        if self.config.expiry.is_some() {
            self.touched_at.insert(path.clone(), Instant::now());
        }
        tracing::trace!(path = %path, entries = listing.len(), "Caching listing");
        self.store.insert(path, listing);
    }

    /// Removes the listing stored for `path`.
    ///
    /// Fails with [`CacheError::NotFound`] if nothing is stored for it.
    pub fn delete(&mut self, path: &str) -> Result<(), CacheError> {
        self.touched_at.remove(path);
        self.store
            .remove(path)
            .map(drop)
            .ok_or_else(|| CacheError::not_found(path))
    }

    /// Returns true iff [`get`](Self::get) would succeed.
    ///
    /// This performs a read, with the same purging side effects.
    pub fn contains(&mut self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    /// Drops every listing, timestamp and recency record.
    pub fn clear(&mut self) {
        self.store.clear();
        self.touched_at.clear();
        if let Some(recency) = self.recency.as_mut() {
            recency.clear();
        }
    }

    /// Returns every path visible at the time of the call, sorted.
    ///
    /// Visibility is decided for all stored paths before any of them is
    /// touched. Expired and out-of-window listings are purged without being
    /// admitted to the window; the remaining paths are then touched in
    /// sorted order.
    pub fn paths(&mut self) -> Vec<String> {
        let mut snapshot: Vec<String> = self.store.keys().cloned().collect();
        snapshot.sort_unstable();

        let mut visible = Vec::with_capacity(snapshot.len());
        for path in snapshot {
            if self.is_expired(&path) {
                self.store.remove(&path);
                self.touched_at.remove(&path);
                self.stats.expired += 1;
                tracing::debug!(path = %path, "Directory listing expired");
            } else if !self.in_window(&path) {
                self.store.remove(&path);
                self.touched_at.remove(&path);
                self.stats.evicted += 1;
                tracing::debug!(path = %path, "Purged listing outside recency window");
            } else {
                visible.push(path);
            }
        }

        // Every visible path is inside the window, so these are all hits.
        for path in &visible {
            self.touch(path);
        }
        visible
    }

    /// Number of listings physically held, including ones that are expired or
    /// outside the recency window but not yet purged.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn is_expired(&self, path: &str) -> bool {
        let Some(expiry) = self.config.expiry else {
            return false;
        };
        self.touched_at
            .get(path)
            .is_some_and(|written| written.elapsed() > expiry)
    }

    /// Whether `path` is inside the recency window, without touching it.
    fn in_window(&self, path: &str) -> bool {
        self.recency
            .as_ref()
            .is_none_or(|recency| recency.contains(path))
    }

    /// Touches `path` in the recency window. Returns true if the path was
    /// outside the window, meaning any stored listing for it is stale.
    fn touch(&mut self, path: &str) -> bool {
        let Some(recency) = self.recency.as_mut() else {
            return false;
        };
        match recency.touch(path) {
            Touch::Hit => false,
            Touch::Miss { displaced } => {
                if let Some(displaced) = displaced {
                    tracing::trace!(path = %displaced, "Path left recency window");
                }
                true
            }
        }
    }
}
