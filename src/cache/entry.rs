//! Cached response representation.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use tokio::time::Instant;

use crate::cache::directives::DirectiveSet;

/// A fully buffered origin response, immutable once built.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Directives from the response's own `Cache-Control` header.
    pub directives: DirectiveSet,
    created_at: Instant,
}

impl CacheEntry {
    /// Build an entry stamped with the current time.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let directives = DirectiveSet::from_headers(&headers);
        Self {
            status,
            headers,
            body,
            directives,
            created_at: Instant::now(),
        }
    }

    /// Time elapsed since the entry was materialized.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Lifetime the requesting client accepts for this entry, if it has one.
    ///
    /// `max-age + max-stale - min-fresh`, clamped at zero.
    pub fn accepted_age(&self, request: &DirectiveSet) -> Option<Duration> {
        let mut accepted = self.directives.max_age?;
        if let Some(stale) = request.max_stale {
            accepted = accepted.saturating_add(stale);
        }
        if let Some(fresh) = request.min_fresh {
            accepted = accepted.saturating_sub(fresh);
        }
        Some(accepted)
    }
}
