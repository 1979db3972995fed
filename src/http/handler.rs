//! Handler and response-writer capabilities.
//!
//! # Responsibilities
//! - Define the single-method `Handler` seam shared by the cache and the proxy
//! - Define the `ResponseWriter` sink handlers write status, headers and body to
//! - Bridge a `Handler` into an axum response with a streaming body
//!
//! # Design Decisions
//! - Status and headers stay mutable until the head is committed; the first
//!   body write (or the end of the handler) commits it
//! - A handler that writes a body without a status gets `200 OK`
//! - The handler runs on its own task; dropping the response aborts the task,
//!   which cancels any in-flight upstream round trip

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::stream;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

/// Number of body chunks buffered between the handler task and the connection.
const BODY_CHANNEL_CAPACITY: usize = 16;

/// Errors surfaced while writing to a response sink.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The client went away; nothing more can be delivered.
    #[error("client connection closed")]
    Closed,
}

/// A sink for one HTTP response.
pub trait ResponseWriter: Send {
    /// Response headers. Changes after the head is committed are not sent.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Set the response status. Ignored once the head is committed.
    fn set_status(&mut self, status: StatusCode);

    /// Write a body chunk, committing the head first if needed.
    fn write<'a>(&'a mut self, chunk: Bytes) -> BoxFuture<'a, Result<(), WriteError>>;

    /// Whether status and headers have been committed.
    fn is_committed(&self) -> bool;

    /// Mark the body as incomplete after a failure past the commit point.
    fn abort(&mut self);
}

/// Anything that can serve an HTTP request into a `ResponseWriter`.
pub trait Handler: Send + Sync + 'static {
    fn serve<'a>(
        &'a self,
        request: Request<Body>,
        writer: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn serve<'a>(
        &'a self,
        request: Request<Body>,
        writer: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()> {
        (**self).serve(request, writer)
    }
}

type BodyChunk = Result<Bytes, io::Error>;

/// Committed response head handed to the connection.
struct Head {
    status: StatusCode,
    headers: HeaderMap,
    body: mpsc::Receiver<BodyChunk>,
}

/// Client-facing writer: the head goes out through a oneshot, body chunks
/// through a bounded channel.
///
/// An abort is a flag read once the channel drains, so it survives a full
/// channel.
pub struct ClientWriter {
    status: StatusCode,
    headers: HeaderMap,
    pending: Option<(oneshot::Sender<Head>, mpsc::Receiver<BodyChunk>)>,
    body_tx: mpsc::Sender<BodyChunk>,
    aborted: Arc<AtomicBool>,
}

impl ClientWriter {
    fn new() -> (Self, oneshot::Receiver<Head>) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let writer = Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            pending: Some((head_tx, body_rx)),
            body_tx,
            aborted: Arc::new(AtomicBool::new(false)),
        };
        (writer, head_rx)
    }

    fn commit(&mut self) -> Result<(), WriteError> {
        let Some((head_tx, body)) = self.pending.take() else {
            return Ok(());
        };

        let head = Head {
            status: self.status,
            headers: std::mem::take(&mut self.headers),
            body,
        };
        head_tx.send(head).map_err(|_| WriteError::Closed)
    }

    /// Commit whatever the handler left behind and close the body.
    fn finish(mut self) {
        let _ = self.commit();
    }
}

impl ResponseWriter for ClientWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn set_status(&mut self, status: StatusCode) {
        if self.is_committed() {
            tracing::debug!(status = %status, "Superfluous status after response head was sent");
            return;
        }
        self.status = status;
    }

    fn write<'a>(&'a mut self, chunk: Bytes) -> BoxFuture<'a, Result<(), WriteError>> {
        Box::pin(async move {
            self.commit()?;
            if chunk.is_empty() {
                return Ok(());
            }
            self.body_tx
                .send(Ok(chunk))
                .await
                .map_err(|_| WriteError::Closed)
        })
    }

    fn is_committed(&self) -> bool {
        self.pending.is_none()
    }

    fn abort(&mut self) {
        if self.is_committed() {
            self.aborted.store(true, Ordering::Release);
        }
    }
}

/// Aborts the handler task when the response (or the dispatch future) is dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run `handler` for `request` and turn what it writes into an axum response.
pub async fn dispatch(handler: Arc<dyn Handler>, request: Request<Body>) -> Response {
    let (mut writer, head_rx) = ClientWriter::new();
    let aborted = writer.aborted.clone();

    let task = tokio::spawn(async move {
        handler.serve(request, &mut writer).await;
        writer.finish();
    });
    let guard = AbortOnDrop(task.abort_handle());

    let head = match head_rx.await {
        Ok(head) => head,
        Err(_) => {
            tracing::error!("Handler ended without producing a response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Queued chunks go out first; an aborted body then ends with an error.
    let body = stream::unfold(Some((head.body, aborted, guard)), |state| async move {
        let (mut rx, aborted, guard) = state?;
        match rx.recv().await {
            Some(chunk) => Some((chunk, Some((rx, aborted, guard)))),
            None if aborted.load(Ordering::Acquire) => {
                Some((Err(io::Error::other("response body aborted")), None))
            }
            None => None,
        }
    });

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    response
}
