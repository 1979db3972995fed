//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use caching_proxy::config::ProxyConfig;
use caching_proxy::http::{Handler, HttpServer, ResponseWriter};
use caching_proxy::lifecycle::Shutdown;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Canned answer for one origin route.
#[derive(Clone)]
struct Route {
    status: StatusCode,
    headers: Vec<(&'static str, &'static str)>,
    body: &'static [u8],
}

/// In-process origin handler with per-path call counters.
#[derive(Default)]
pub struct MockOrigin {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockOrigin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `path` with a status and headers only.
    pub fn status_route(&self, path: &str, status: u16, headers: &[(&'static str, &'static str)]) {
        self.data_route(path, status, b"", headers);
    }

    /// Answer `path` with a status, headers and body.
    pub fn data_route(
        &self,
        path: &str,
        status: u16,
        body: &'static [u8],
        headers: &[(&'static str, &'static str)],
    ) {
        let route = Route {
            status: StatusCode::from_u16(status).unwrap(),
            headers: headers.to_vec(),
            body,
        };
        self.routes.lock().unwrap().insert(path.to_string(), route);
    }

    /// How many requests reached `path`.
    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

impl Handler for MockOrigin {
    fn serve<'a>(
        &'a self,
        request: Request<Body>,
        writer: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()> {
        let path = request.uri().path().to_string();
        *self.calls.lock().unwrap().entry(path.clone()).or_default() += 1;
        let route = self.routes.lock().unwrap().get(&path).cloned();

        Box::pin(async move {
            let Some(route) = route else {
                writer.set_status(StatusCode::NOT_FOUND);
                return;
            };

            writer.set_status(route.status);
            for &(name, value) in &route.headers {
                writer
                    .headers_mut()
                    .append(HeaderName::from_static(name), HeaderValue::from_static(value));
            }
            if !route.body.is_empty() {
                let _ = writer.write(Bytes::from_static(route.body)).await;
            }
        })
    }
}

/// What the raw-TCP backend saw.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw-TCP origin answering every connection with whatever `f` returns.
///
/// `f` receives the parsed request head and returns status, extra headers and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(SeenRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, Vec<(&'static str, String)>, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let Some(seen) = read_head(&mut socket).await else {
                    return;
                };
                let (status, headers, body) = f(seen).await;
                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown");

                let mut response = format!("HTTP/1.1 {status} {reason}\r\n");
                for (name, value) in headers {
                    response.push_str(&format!("{name}: {value}\r\n"));
                }
                response.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                ));
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Raw-TCP origin that sends a response head promising more body than it delivers.
pub async fn start_truncating_backend(promised: usize, sent: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_head(&mut socket).await.is_none() {
                    return;
                }
                let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {promised}\r\n\r\n{sent}");
                let _ = socket.write_all(response.as_bytes()).await;
                tokio::time::sleep(Duration::from_millis(50)).await;
            });
        }
    });

    addr
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> Option<SeenRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    Some(SeenRequest { method, target, headers })
}

/// Port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Run the proxy for `config` on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> SocketAddr {
    let server = HttpServer::new(config).expect("proxy configuration");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.run(listener, Arc::new(Shutdown::new())).await;
    });

    addr
}

/// Proxy configuration forwarding to `target`.
pub fn proxy_config(target: String, cache: bool) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.target = Some(target);
    config.cache.enabled = cache;
    config.timeouts.connect_secs = 1;
    config.timeouts.upstream_secs = 5;
    config
}
