//! Cache storage backends.
//!
//! # Responsibilities
//! - Map cache keys to fully built entries
//! - Stay safe under any number of concurrent readers and writers
//!
//! # Design Decisions
//! - Entries are shared as `Arc<CacheEntry>`; a reader never sees a half-built one
//! - No eviction and no TTL purge: staleness is judged at read time by the middleware
//! - The trait is async and fallible so network-backed stores fit the same seam

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::{self, BoxFuture};
use thiserror::Error;

use crate::cache::entry::CacheEntry;
use crate::observability::metrics;

/// Errors a store backend may report.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend answered but the operation failed.
    #[error("store operation failed: {0}")]
    Backend(String),
}

/// Key to entry mapping used by the cache middleware.
pub trait Store: Send + Sync {
    /// Look up the entry stored under `key`.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Arc<CacheEntry>>, StoreError>>;

    /// Store `entry` under `key`, replacing any previous entry.
    fn put(&self, key: String, entry: CacheEntry) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Process-wide in-memory store backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Arc<CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Store for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Arc<CacheEntry>>, StoreError>> {
        let entry = self.entries.get(key).map(|r| Arc::clone(r.value()));
        Box::pin(future::ready(Ok(entry)))
    }

    fn put(&self, key: String, entry: CacheEntry) -> BoxFuture<'_, Result<(), StoreError>> {
        self.entries.insert(key, Arc::new(entry));
        metrics::record_cache_size(self.entries.len());
        Box::pin(future::ready(Ok(())))
    }
}
