//! Listing cache and write transactions for virtual filesystem layers.
//!
//! This crate provides two primitives that a pluggable filesystem
//! abstraction builds on. Backends (local disk, object stores, ...) stay
//! outside; they produce listings and write handles, and this crate decides
//! what to keep and when to finalize.
//!
//! # Components
//!
//! ## Directory cache
//!
//! - [`DirCache`] - Path to [`Listing`] map with expiry and a lazily
//!   enforced recency bound
//! - [`DirCacheConfig`] - Construction-time options (enabled, expiry,
//!   max_paths)
//! - [`Entry`], [`EntryKind`], [`Listing`] - The stored records
//!
//! ## Transactions
//!
//! - [`Transaction`] - Per-filesystem slot coordinating deferred writes
//! - [`WriteHandle`] - Contract for a backend's in-progress write
//! - [`Finalizer`] - Where handles are collected: [`LocalFinalizer`] or
//!   [`RemoteFinalizer`]
//! - [`TransactionScope`] - Guard that discards on drop unless committed
//!
//! # Example
//!
//! ```
//! use vfskit_core::{DirCache, DirCacheConfig, Entry, Listing};
//! use std::time::Duration;
//!
//! let mut cache = DirCache::new(
//!     DirCacheConfig::default()
//!         .with_expiry(Duration::from_secs(30))
//!         .with_max_paths(1024),
//! );
//!
//! cache.set(
//!     "bucket/data",
//!     Listing::new(vec![
//!         Entry::file("bucket/data/a.csv", 120),
//!         Entry::directory("bucket/data/raw"),
//!     ]),
//! );
//!
//! let listing = cache.get("bucket/data").unwrap();
//! assert_eq!(listing.len(), 2);
//! assert!(cache.get("bucket/other").is_err());
//! ```

#![warn(clippy::all)]

mod dircache;
mod error;
mod listing;
pub mod transaction;

/// Test doubles for write handles and remote executors.
pub mod testing;

pub use dircache::{DirCache, DirCacheConfig, DirCacheStats};
pub use error::{CacheError, FinalizeAction, FinalizeFailure, TransactionError};
pub use listing::{Entry, EntryKind, Listing};
pub use transaction::remote::{CollectorCall, FileCollector, RemoteCollector, RemoteExecutor};
pub use transaction::{
    Finalizer, LocalFinalizer, RemoteFinalizer, ScopeError, Transaction, TransactionScope,
    TransactionState, WriteHandle,
};
