//! Buffering response writer.
//!
//! Stands in for the client writer while the origin handler runs, then turns
//! what was written into a `CacheEntry`.

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use futures_util::future::{self, BoxFuture};

use crate::cache::entry::CacheEntry;
use crate::http::handler::{ResponseWriter, WriteError};

/// Buffers status, headers and body instead of transmitting them.
#[derive(Debug, Default)]
pub struct ResponseCapture {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    body_started: bool,
    aborted: bool,
}

impl ResponseCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the handler reported an incomplete body.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Materialize the buffered response, stamped with the current time.
    ///
    /// A handler that never wrote anything yields an empty `200 OK`.
    pub fn finish(self) -> CacheEntry {
        CacheEntry::new(
            self.status.unwrap_or(StatusCode::OK),
            self.headers,
            Bytes::from(self.body),
        )
    }
}

impl ResponseWriter for ResponseCapture {
    // Headers stay mutable after body bytes: they are only sent on replay.
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn set_status(&mut self, status: StatusCode) {
        if self.body_started {
            tracing::debug!(status = %status, "Superfluous status after body bytes were written");
            return;
        }
        self.status = Some(status);
    }

    fn write<'a>(&'a mut self, chunk: Bytes) -> BoxFuture<'a, Result<(), WriteError>> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body_started = true;
        self.body.extend_from_slice(&chunk);
        Box::pin(future::ready(Ok(())))
    }

    fn is_committed(&self) -> bool {
        self.body_started
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}
