//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with a catch-all proxy route
//! - Wire up middleware (request ID, tracing)
//! - Build the handler chain (cache in front of the forwarding engine)
//! - Serve plain HTTP or TLS, draining on shutdown
//! - Observability (metrics, correlation IDs)

use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;

use crate::cache::{CacheHandler, MemoryStore, Store};
use crate::config::ProxyConfig;
use crate::http::handler::{dispatch, Handler};
use crate::http::request::{RequestIdExt, UuidRequestId};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::proxy::{ForwardError, ForwardingEngine};

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Upstream(#[from] ForwardError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<dyn Handler>,
}

/// HTTP server for the caching proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let handler = build_handler(&config)?;
        Ok(Self::with_handler(config, handler))
    }

    /// Create a server that answers every request with `handler`.
    pub fn with_handler(config: ProxyConfig, handler: Arc<dyn Handler>) -> Self {
        let router = Self::build_router(AppState { handler });
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http().make_span_with(make_span))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// The fully layered router, for in-process serving.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    fn grace_period(&self) -> Duration {
        Duration::from_secs(self.config.timeouts.shutdown_grace_secs)
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Returns once shutdown was triggered and in-flight requests drained, or
    /// the grace period ran out.
    pub async fn run(self, listener: TcpListener, shutdown: Arc<Shutdown>) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        let grace = self.grace_period();
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.signalled())
            .into_future();

        let deadline = shutdown.signalled();
        tokio::select! {
            result = server => result?,
            _ = async move {
                deadline.await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, dropping open connections");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server with TLS termination on `addr`.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown: Arc<Shutdown>,
    ) -> Result<(), ServerError> {
        let grace = self.grace_period();
        let handle = axum_server::Handle::new();

        let drain = handle.clone();
        let signalled = shutdown.signalled();
        tokio::spawn(async move {
            signalled.await;
            drain.graceful_shutdown(Some(grace));
        });

        tracing::info!(address = %addr, "HTTPS server starting");
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Build the request handler chain described by `config`.
pub fn build_handler(config: &ProxyConfig) -> Result<Arc<dyn Handler>, ServerError> {
    let engine = ForwardingEngine::from_config(&config.upstream, &config.timeouts)?;
    if !config.cache.enabled {
        return Ok(Arc::new(engine));
    }

    let statuses = config
        .cache
        .cacheable_statuses
        .iter()
        .filter_map(|status| StatusCode::from_u16(*status).ok());
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    Ok(Arc::new(CacheHandler::new(store, engine).with_cacheable_statuses(statuses)))
}

fn make_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = request.request_id().unwrap_or("-"),
    )
}

/// Catch-all route: hand the request to the handler chain.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let response = dispatch(state.handler, request).await;

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::ResponseWriter;
    use crate::http::request::X_REQUEST_ID;
    use axum::body::Bytes;
    use axum::http::HeaderValue;
    use futures_util::future::BoxFuture;
    use tower::ServiceExt;

    /// Echoes the request path and the request ID it saw.
    struct Echo;

    impl Handler for Echo {
        fn serve<'a>(
            &'a self,
            request: Request<Body>,
            writer: &'a mut dyn ResponseWriter,
        ) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                if let Some(id) = request.headers().get(X_REQUEST_ID) {
                    writer.headers_mut().insert("x-seen-id", id.clone());
                }
                writer.set_status(StatusCode::ACCEPTED);
                let _ = writer.write(Bytes::from(request.uri().path().to_string())).await;
            })
        }
    }

    fn server() -> HttpServer {
        HttpServer::with_handler(ProxyConfig::default(), Arc::new(Echo))
    }

    #[tokio::test]
    async fn test_every_path_reaches_handler() {
        for path in ["/", "/api/entities", "/deeply/nested/path"] {
            let request = Request::builder().uri(path).body(Body::empty()).unwrap();
            let response = server().router().oneshot(request).await.unwrap();

            assert_eq!(response.status(), StatusCode::ACCEPTED);
            let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(body, path);
        }
    }

    #[tokio::test]
    async fn test_request_id_generated_and_propagated() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = server().router().oneshot(request).await.unwrap();

        let id = response.headers()[X_REQUEST_ID].clone();
        assert_eq!(response.headers()["x-seen-id"], id);
        assert!(uuid::Uuid::parse_str(id.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_client_request_id_kept() {
        let request = Request::builder()
            .uri("/")
            .header(X_REQUEST_ID, HeaderValue::from_static("client-id"))
            .body(Body::empty())
            .unwrap();
        let response = server().router().oneshot(request).await.unwrap();

        assert_eq!(response.headers()[X_REQUEST_ID], "client-id");
        assert_eq!(response.headers()["x-seen-id"], "client-id");
    }

    #[tokio::test]
    async fn test_build_handler_requires_valid_upstream() {
        let mut config = ProxyConfig::default();
        config.upstream.target = Some("http://127.0.0.1:9000".to_string());
        config.cache.enabled = true;
        assert!(build_handler(&config).is_ok());

        config.upstream.target = Some("::not a url::".to_string());
        assert!(matches!(build_handler(&config), Err(ServerError::Upstream(_))));
    }
}
