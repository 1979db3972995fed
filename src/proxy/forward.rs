//! Reverse-proxy handler.
//!
//! # Responsibilities
//! - Resolve the upstream URI (target composition or exact-path table)
//! - Clean the outgoing request (hop-by-hop headers, Host, X-Forwarded-For)
//! - Execute a single round trip through the configured `Transport`
//! - Relay status, then headers, then the streamed body to the writer
//!
//! # Design Decisions
//! - Every failure before the head is committed becomes a bare 502
//! - After the head is committed a failure can only truncate the body
//! - Origin headers are appended, never replacing what the writer already holds

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::uri::{Authority, Scheme};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use thiserror::Error;
use url::Url;

use crate::config::{TimeoutsConfig, UpstreamConfig};
use crate::http::handler::{Handler, ResponseWriter, WriteError};
use crate::observability::metrics;
use crate::proxy::transport::{HyperTransport, ReqwestTransport, Transport, TransportError};
use crate::proxy::uri;

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Errors raised while preparing the outgoing request.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Table mode and no route for the request path.
    #[error("no upstream route for {0}")]
    NoRoute(String),

    /// The composed upstream URI is not valid.
    #[error("invalid upstream uri: {0}")]
    InvalidUri(#[from] axum::http::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Configured upstream cannot be turned into an engine.
    #[error("invalid upstream configuration: {0}")]
    Config(String),
}

impl ForwardError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::NoRoute(_) => "no_route",
            ForwardError::InvalidUri(_) => "invalid_uri",
            ForwardError::Transport(e) => e.kind(),
            ForwardError::Config(_) => "config",
        }
    }
}

/// Errors raised while relaying the origin response.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The origin body failed mid-stream.
    #[error("upstream body failed: {0}")]
    Body(#[from] axum::Error),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Upstream location for one table entry.
#[derive(Debug, Clone)]
pub struct UpstreamRoute {
    pub scheme: Scheme,
    pub authority: Authority,
}

/// Where requests are sent.
#[derive(Debug, Clone)]
pub enum Upstream {
    /// Single base URL; request paths and queries are appended to it.
    Target(Url),
    /// Exact request path to upstream location.
    Table(HashMap<String, UpstreamRoute>),
}

impl Upstream {
    fn resolve(&self, inbound: &Uri) -> Result<Uri, ForwardError> {
        match self {
            Upstream::Target(target) => Ok(uri::compose(target, inbound)?),
            Upstream::Table(routes) => {
                let route = routes
                    .get(inbound.path())
                    .ok_or_else(|| ForwardError::NoRoute(inbound.path().to_string()))?;
                let path_and_query = inbound.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

                Ok(Uri::builder()
                    .scheme(route.scheme.clone())
                    .authority(route.authority.clone())
                    .path_and_query(path_and_query)
                    .build()?)
            }
        }
    }

    fn uses_https(&self) -> bool {
        match self {
            Upstream::Target(target) => target.scheme() == "https",
            Upstream::Table(routes) => routes.values().any(|r| r.scheme == Scheme::HTTPS),
        }
    }

    /// Build from the `[upstream]` section. Assumes it passed validation.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, ForwardError> {
        if let Some(target) = &config.target {
            let url = Url::parse(target).map_err(|e| ForwardError::Config(format!("target {target}: {e}")))?;
            return Ok(Upstream::Target(url));
        }

        let mut routes = HashMap::with_capacity(config.routes.len());
        for route in &config.routes {
            let scheme = Scheme::try_from(route.scheme.as_str())
                .map_err(|e| ForwardError::Config(format!("scheme {}: {e}", route.scheme)))?;
            let authority = Authority::try_from(route.authority.as_str())
                .map_err(|e| ForwardError::Config(format!("authority {}: {e}", route.authority)))?;
            routes.insert(route.path.clone(), UpstreamRoute { scheme, authority });
        }
        Ok(Upstream::Table(routes))
    }
}

/// Handler that forwards every request to the upstream.
pub struct ForwardingEngine {
    upstream: Upstream,
    transport: Arc<dyn Transport>,
    preserve_host: bool,
}

impl ForwardingEngine {
    pub fn new(upstream: Upstream, transport: Arc<dyn Transport>) -> Self {
        Self {
            upstream,
            transport,
            preserve_host: false,
        }
    }

    /// Keep the inbound `Host` header instead of deriving it from the upstream URI.
    pub fn preserve_host(mut self, preserve: bool) -> Self {
        self.preserve_host = preserve;
        self
    }

    /// Build the engine and its transport from configuration.
    ///
    /// HTTPS upstreams use the rustls-backed transport, plain HTTP the pooled
    /// hyper client.
    pub fn from_config(upstream: &UpstreamConfig, timeouts: &TimeoutsConfig) -> Result<Self, ForwardError> {
        let target = Upstream::from_config(upstream)?;
        let connect_timeout = Duration::from_secs(timeouts.connect_secs);
        let round_trip_timeout = (timeouts.upstream_secs > 0).then(|| Duration::from_secs(timeouts.upstream_secs));

        let transport: Arc<dyn Transport> = if target.uses_https() {
            Arc::new(ReqwestTransport::new(connect_timeout, round_trip_timeout, upstream.insecure_tls)?)
        } else {
            Arc::new(HyperTransport::new(connect_timeout, round_trip_timeout))
        };

        Ok(Self::new(target, transport).preserve_host(upstream.preserve_host))
    }

    async fn handle(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let outgoing = match self.prepare(request) {
            Ok(outgoing) => outgoing,
            Err(e) => {
                tracing::error!(method = %method, path = %path, error = %e, "Error while preparing upstream request");
                metrics::record_upstream_error(e.kind());
                writer.set_status(StatusCode::BAD_GATEWAY);
                return;
            }
        };
        let upstream_uri = outgoing.uri().clone();

        let response = match self.transport.round_trip(outgoing).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(method = %method, upstream = %upstream_uri, error = %e, "Error while sending request");
                metrics::record_upstream_error(e.kind());
                writer.set_status(StatusCode::BAD_GATEWAY);
                return;
            }
        };

        metrics::record_upstream(response.status().as_u16(), start);
        tracing::debug!(
            method = %method,
            upstream = %upstream_uri,
            status = %response.status(),
            "Upstream responded"
        );

        if let Err(e) = relay(response, writer).await {
            tracing::warn!(method = %method, upstream = %upstream_uri, error = %e, "Error while copying response");
        }
    }

    /// Turn the inbound request into the outgoing one.
    fn prepare(&self, request: Request<Body>) -> Result<Request<Body>, ForwardError> {
        let (mut parts, body) = request.into_parts();

        parts.uri = self.upstream.resolve(&parts.uri)?;
        strip_hop_by_hop(&mut parts.headers);
        if !self.preserve_host {
            parts.headers.remove(header::HOST);
        }

        let client = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        if let Some(ip) = client {
            append_forwarded_for(&mut parts.headers, ip);
        }

        Ok(Request::from_parts(parts, body))
    }
}

impl Handler for ForwardingEngine {
    fn serve<'a>(
        &'a self,
        request: Request<Body>,
        writer: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.handle(request, writer))
    }
}

/// Copy the origin response to `writer`: status, then headers, then body.
///
/// A body failure before the head is committed restores the writer's own
/// headers and answers 502; afterwards the body is aborted.
pub async fn relay(response: Response<Body>, writer: &mut dyn ResponseWriter) -> Result<(), RelayError> {
    let (parts, body) = response.into_parts();
    let own_headers = writer.headers_mut().clone();

    writer.set_status(parts.status);
    let mut origin_headers = parts.headers;
    strip_hop_by_hop(&mut origin_headers);
    let headers = writer.headers_mut();
    for (name, value) in origin_headers.iter() {
        headers.append(name.clone(), value.clone());
    }

    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                if writer.is_committed() {
                    writer.abort();
                } else {
                    *writer.headers_mut() = own_headers;
                    writer.set_status(StatusCode::BAD_GATEWAY);
                }
                return Err(RelayError::Body(e));
            }
        };
        writer.write(chunk).await?;
    }
    Ok(())
}

/// Remove hop-by-hop headers, including those named by `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {ip}"),
        None => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::capture::ResponseCapture;
    use axum::body::Bytes;
    use futures_util::{future, stream};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Transport answering from a closure and keeping the last request.
    struct MockTransport {
        respond: fn() -> Result<Response<Body>, TransportError>,
        seen: Mutex<Option<(Uri, HeaderMap)>>,
        calls: AtomicUsize,
    }

    impl MockTransport {
        fn new(respond: fn() -> Result<Response<Body>, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                respond,
                seen: Mutex::new(None),
                calls: AtomicUsize::new(0),
            })
        }

        fn seen(&self) -> (Uri, HeaderMap) {
            self.seen.lock().unwrap().clone().expect("no request reached the transport")
        }
    }

    impl Transport for MockTransport {
        fn round_trip(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, TransportError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = Some((request.uri().clone(), request.headers().clone()));
            Box::pin(future::ready((self.respond)()))
        }
    }

    fn ok_response() -> Result<Response<Body>, TransportError> {
        Ok(Response::builder()
            .status(StatusCode::CREATED)
            .header("x-origin", "origin")
            .header("x-multi", "a")
            .header("x-multi", "b")
            .header(header::CONNECTION, "close")
            .body(Body::from("origin body"))
            .unwrap())
    }

    fn refused() -> Result<Response<Body>, TransportError> {
        Err(TransportError::Connect("connection refused".into()))
    }

    fn broken_body() -> Result<Response<Body>, TransportError> {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![Err(io::Error::other("reset"))];
        Ok(Response::builder()
            .header("x-origin", "origin")
            .body(Body::from_stream(stream::iter(chunks)))
            .unwrap())
    }

    fn truncated_body() -> Result<Response<Body>, TransportError> {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"first")),
            Err(io::Error::other("reset")),
        ];
        Ok(Response::new(Body::from_stream(stream::iter(chunks))))
    }

    fn target_engine(transport: Arc<MockTransport>) -> ForwardingEngine {
        let target = Url::parse("http://origin.local/api?q2=test2").unwrap();
        ForwardingEngine::new(Upstream::Target(target), transport)
    }

    async fn call(engine: &ForwardingEngine, request: Request<Body>, writer: &mut ResponseCapture) {
        engine.serve(request, writer).await;
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_relays_status_headers_body() {
        let transport = MockTransport::new(ok_response);
        let engine = target_engine(transport.clone());

        let mut capture = ResponseCapture::new();
        capture.headers_mut().insert("x-origin", HeaderValue::from_static("outer"));
        call(&engine, get("/entities?q=test"), &mut capture).await;

        let (uri, _) = transport.seen();
        assert_eq!(uri, "http://origin.local/api/entities?q2=test2&q=test");

        let entry = capture.finish();
        assert_eq!(entry.status, StatusCode::CREATED);
        assert_eq!(entry.body, "origin body");
        let origin: Vec<_> = entry.headers.get_all("x-origin").iter().collect();
        assert_eq!(origin, ["outer", "origin"]);
        assert_eq!(entry.headers.get_all("x-multi").iter().count(), 2);
        assert!(entry.headers.get(header::CONNECTION).is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_is_bad_gateway() {
        let engine = target_engine(MockTransport::new(refused));

        let mut capture = ResponseCapture::new();
        call(&engine, get("/"), &mut capture).await;

        assert!(!capture.is_committed());
        let entry = capture.finish();
        assert_eq!(entry.status, StatusCode::BAD_GATEWAY);
        assert!(entry.body.is_empty());
    }

    #[tokio::test]
    async fn test_body_failure_before_commit() {
        let engine = target_engine(MockTransport::new(broken_body));

        let mut capture = ResponseCapture::new();
        capture.headers_mut().insert("x-outer", HeaderValue::from_static("kept"));
        call(&engine, get("/"), &mut capture).await;

        assert!(!capture.is_aborted());
        let entry = capture.finish();
        assert_eq!(entry.status, StatusCode::BAD_GATEWAY);
        assert!(entry.headers.get("x-origin").is_none());
        assert_eq!(entry.headers["x-outer"], "kept");
    }

    #[tokio::test]
    async fn test_body_failure_after_commit_aborts() {
        let engine = target_engine(MockTransport::new(truncated_body));

        let mut capture = ResponseCapture::new();
        call(&engine, get("/"), &mut capture).await;

        assert!(capture.is_aborted());
        let entry = capture.finish();
        assert_eq!(entry.status, StatusCode::OK);
        assert_eq!(entry.body, "first");
    }

    #[tokio::test]
    async fn test_outgoing_request_headers() {
        let transport = MockTransport::new(ok_response);
        let engine = target_engine(transport.clone());

        let mut request = Request::builder()
            .uri("/")
            .header(header::HOST, "proxy.local")
            .header(header::CONNECTION, "keep-alive, x-session-hop")
            .header("keep-alive", "timeout=5")
            .header("x-session-hop", "1")
            .header("x-forwarded-for", "10.0.0.1")
            .header("x-end-to-end", "1")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo("192.168.1.7:40000".parse::<SocketAddr>().unwrap()));

        call(&engine, request, &mut ResponseCapture::new()).await;

        let (_, headers) = transport.seen();
        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get("x-session-hop").is_none());
        assert_eq!(headers["x-end-to-end"], "1");
        assert_eq!(headers["x-forwarded-for"], "10.0.0.1, 192.168.1.7");
    }

    #[tokio::test]
    async fn test_preserve_host() {
        let transport = MockTransport::new(ok_response);
        let engine = target_engine(transport.clone()).preserve_host(true);

        let request = Request::builder()
            .uri("/")
            .header(header::HOST, "proxy.local")
            .body(Body::empty())
            .unwrap();
        call(&engine, request, &mut ResponseCapture::new()).await;

        assert_eq!(transport.seen().1[header::HOST], "proxy.local");
    }

    #[tokio::test]
    async fn test_table_routing() {
        let transport = MockTransport::new(ok_response);
        let routes = HashMap::from([(
            "/api/hello".to_string(),
            UpstreamRoute {
                scheme: Scheme::HTTP,
                authority: Authority::from_static("127.0.0.1:9001"),
            },
        )]);
        let engine = ForwardingEngine::new(Upstream::Table(routes), transport.clone());

        call(&engine, get("/api/hello?x=1"), &mut ResponseCapture::new()).await;
        assert_eq!(transport.seen().0, "http://127.0.0.1:9001/api/hello?x=1");

        let mut capture = ResponseCapture::new();
        call(&engine, get("/api/other"), &mut capture).await;
        assert_eq!(capture.finish().status, StatusCode::BAD_GATEWAY);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_upstream_from_config() {
        let mut config = UpstreamConfig {
            target: Some("https://origin.local/api".into()),
            ..Default::default()
        };
        let upstream = Upstream::from_config(&config).unwrap();
        assert!(upstream.uses_https());

        config.target = None;
        config.routes = vec![crate::config::RouteConfig {
            path: "/a".into(),
            authority: "127.0.0.1:9001".into(),
            scheme: "http".into(),
        }];
        let upstream = Upstream::from_config(&config).unwrap();
        assert!(matches!(upstream, Upstream::Table(ref routes) if routes.contains_key("/a")));
        assert!(!upstream.uses_https());
    }
}
