//! Caching middleware.
//!
//! Wraps any `Handler` and decides per request whether a stored response can
//! answer it. The client and the origin steer the decision with
//! `Cache-Control` (RFC 7234).
//!
//! ```text
//! classify ─ not cacheable ──────────────────────────▶ origin (nothing stored)
//!    │
//!    ▼
//! lookup ─ fresh enough for this client ─────────────▶ replay entry (+ Age)
//!    │
//!    ▼
//! only-if-cached? ─ yes ─────────────────────────────▶ 504
//!    │
//!    ▼
//! origin → capture → replay → storable? ─ yes ───────▶ store.put
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use futures_util::future::BoxFuture;

use crate::cache::capture::ResponseCapture;
use crate::cache::entry::CacheEntry;
use crate::cache::request::CacheRequest;
use crate::cache::store::Store;
use crate::http::handler::{Handler, ResponseWriter, WriteError};
use crate::observability::metrics;

/// Statuses whose responses may be stored unless configured otherwise.
pub const DEFAULT_CACHEABLE_STATUSES: [StatusCode; 5] = [
    StatusCode::OK,
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::NOT_MODIFIED,
    StatusCode::NOT_FOUND,
];

/// Outcome of the cache lookup for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Served from the store.
    Hit,
    /// An entry existed but was too old for this client.
    Stale,
    /// Nothing stored under the key.
    Miss,
    /// The request skipped the cache entirely.
    Bypass,
    /// `only-if-cached` could not be satisfied.
    OnlyIfCached,
}

impl LookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupOutcome::Hit => "hit",
            LookupOutcome::Stale => "stale",
            LookupOutcome::Miss => "miss",
            LookupOutcome::Bypass => "bypass",
            LookupOutcome::OnlyIfCached => "only_if_cached",
        }
    }
}

/// Cache layer in front of an origin handler.
pub struct CacheHandler<H> {
    store: Arc<dyn Store>,
    origin: H,
    cacheable_statuses: HashSet<StatusCode>,
}

impl<H: Handler> CacheHandler<H> {
    /// Put `origin` behind a cache backed by `store`.
    pub fn new(store: Arc<dyn Store>, origin: H) -> Self {
        Self {
            store,
            origin,
            cacheable_statuses: DEFAULT_CACHEABLE_STATUSES.into_iter().collect(),
        }
    }

    /// Replace the storable status allow-list for this instance.
    pub fn with_cacheable_statuses(mut self, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        self.cacheable_statuses = statuses.into_iter().collect();
        self
    }

    async fn handle(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
        let request = CacheRequest::new(request);

        if !request.is_cacheable() {
            tracing::debug!(method = %request.method(), key = %request.key(), "Not cacheable");
            metrics::record_cache_lookup(LookupOutcome::Bypass.as_str());
            self.origin.serve(request.into_inner(), writer).await;
            return;
        }

        let mut outcome = LookupOutcome::Miss;
        if let Some(entry) = self.load(request.key()).await {
            // Entries stored without a lifetime are served unconditionally.
            let accepted = entry.accepted_age(request.directives());
            let fresh = accepted.map_or(true, |accepted| entry.age() < accepted);

            if fresh {
                tracing::debug!(key = %request.key(), age = ?entry.age(), "Forwarding resource to client");
                metrics::record_cache_lookup(LookupOutcome::Hit.as_str());
                if let Err(e) = replay(&entry, writer).await {
                    tracing::debug!(key = %request.key(), error = %e, "Client went away during replay");
                }
                return;
            }
            outcome = LookupOutcome::Stale;
        }

        tracing::debug!(key = %request.key(), outcome = outcome.as_str(), "No resources matched in cache");

        if request.directives().only_cached {
            metrics::record_cache_lookup(LookupOutcome::OnlyIfCached.as_str());
            writer.set_status(StatusCode::GATEWAY_TIMEOUT);
            return;
        }

        metrics::record_cache_lookup(outcome.as_str());
        self.forward_to_origin(request, writer).await;
    }

    /// Fetch from the origin through a capture, replay, then maybe store.
    async fn forward_to_origin(&self, request: CacheRequest, writer: &mut dyn ResponseWriter) {
        let key = request.key().to_string();
        // HEAD shares the GET key but carries no body, so it only reads.
        let head = request.method() == Method::HEAD;

        let mut capture = ResponseCapture::new();
        self.origin.serve(request.into_inner(), &mut capture).await;

        // Nothing reached the client yet, so an incomplete origin body is a 502.
        if capture.is_aborted() {
            tracing::warn!(key = %key, "Origin body incomplete, not forwarding partial response");
            writer.set_status(StatusCode::BAD_GATEWAY);
            return;
        }
        let entry = capture.finish();

        if let Err(e) = replay(&entry, writer).await {
            tracing::debug!(key = %key, error = %e, "Client went away during replay");
        }

        if head || !self.is_storable(&entry) {
            return;
        }

        tracing::debug!(key = %key, status = %entry.status, "Storing resource in cache");
        match self.store.put(key.clone(), entry).await {
            Ok(()) => metrics::record_cache_store(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache store failed, response not stored");
                metrics::record_cache_store_error("put");
            }
        }
    }

    async fn load(&self, key: &str) -> Option<Arc<CacheEntry>> {
        match self.store.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache lookup failed, treating as miss");
                metrics::record_cache_store_error("get");
                None
            }
        }
    }

    /// Allowed status, no `no-store`/`no-cache`, not private, no `max-age=0`.
    fn is_storable(&self, entry: &CacheEntry) -> bool {
        let cc = &entry.directives;

        if !self.cacheable_statuses.contains(&entry.status) {
            return false;
        }

        if cc.no_store || cc.no_cache {
            return false;
        }

        if !cc.public {
            return false;
        }

        !cc.has_zero_max_age()
    }
}

impl<H: Handler> Handler for CacheHandler<H> {
    fn serve<'a>(
        &'a self,
        request: Request<Body>,
        writer: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.handle(request, writer))
    }
}

/// Write `entry` to `writer`: headers, then status, then body.
///
/// Entries with a freshness lifetime get an `Age` header in whole seconds.
async fn replay(entry: &CacheEntry, writer: &mut dyn ResponseWriter) -> Result<(), WriteError> {
    let headers = writer.headers_mut();
    for (name, value) in entry.headers.iter() {
        headers.append(name.clone(), value.clone());
    }

    if entry.directives.max_age.is_some() {
        headers.insert(header::AGE, HeaderValue::from(entry.age().as_secs()));
    }

    writer.set_status(entry.status);
    if !entry.body.is_empty() {
        writer.write(entry.body.clone()).await?;
    }
    Ok(())
}
