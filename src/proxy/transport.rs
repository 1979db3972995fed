//! Pluggable round-trip transports.
//!
//! # Design Decisions
//! - One call, one request, one response head; the body streams afterwards
//! - Transports never retry and never follow redirects
//! - Any failure is reported as a `TransportError` and answered with 502 upstream

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, Version};
use futures_util::future::BoxFuture;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

/// Round-trip failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The origin could not be reached.
    #[error("connection to upstream failed: {0}")]
    Connect(String),

    /// No response head arrived in time.
    #[error("upstream timed out")]
    Timeout,

    /// Anything else (protocol errors, TLS errors, unreadable request body).
    #[error("upstream request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Connect(_) => "connect",
            TransportError::Timeout => "timeout",
            TransportError::Other(_) => "other",
        }
    }
}

/// Executes a single HTTP exchange with an upstream server.
pub trait Transport: Send + Sync + 'static {
    /// Send `request` (absolute URI) and resolve once the response head arrives.
    fn round_trip(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, TransportError>>;
}

/// Plain-HTTP transport on the pooled hyper client.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
    timeout: Option<Duration>,
}

impl HyperTransport {
    /// `timeout` bounds the wait for the response head; `None` waits forever.
    pub fn new(connect_timeout: Duration, timeout: Option<Duration>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client, timeout }
    }
}

impl Transport for HyperTransport {
    fn round_trip(&self, mut request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, TransportError>> {
        // The pooled client speaks HTTP/1.1 upstream whatever the client used.
        *request.version_mut() = Version::HTTP_11;
        let pending = self.client.request(request);
        let timeout = self.timeout;

        Box::pin(async move {
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, pending)
                    .await
                    .map_err(|_| TransportError::Timeout)?,
                None => pending.await,
            };

            match result {
                Ok(response) => Ok(response.map(Body::new)),
                Err(e) if e.is_connect() => Err(TransportError::Connect(e.to_string())),
                Err(e) => Err(TransportError::Other(e.to_string())),
            }
        })
    }
}

/// HTTPS-capable transport built on `reqwest` with rustls.
///
/// The request body is buffered before sending; the response body streams.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// `insecure_tls` disables certificate verification towards the origin.
    pub fn new(
        connect_timeout: Duration,
        timeout: Option<Duration>,
        insecure_tls: bool,
    ) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(insecure_tls)
            .http1_only();
        if let Some(limit) = timeout {
            builder = builder.timeout(limit);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

impl Transport for ReqwestTransport {
    fn round_trip(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, TransportError>> {
        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX)
                .await
                .map_err(|e| TransportError::Other(format!("reading request body: {e}")))?;

            let upstream = self
                .client
                .request(parts.method, parts.uri.to_string())
                .headers(parts.headers)
                .body(body)
                .send()
                .await?;

            let status = upstream.status();
            let headers = upstream.headers().clone();
            let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            Ok(response)
        })
    }
}
