//! Demo origin server to put behind the proxy.
//!
//! ```text
//! cargo run --example demo_origin -- --bind 127.0.0.1:9000
//! caching-proxy -t http://127.0.0.1:9000 -c
//! curl -i localhost:8080/api/max-age?t=5
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::Query;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::routing::get;
use axum::Router;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(about = "Origin serving /api/hello-world and /api/max-age?t=N")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:9000")]
    bind: SocketAddr,
}

async fn hello_world() -> &'static str {
    "Hello from demo_origin\n"
}

/// Echo `t` back as the response's `max-age`.
async fn max_age(Query(params): Query<HashMap<String, String>>) -> (HeaderMap, String) {
    let age = params.get("t").cloned().unwrap_or_default();

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!("max-age={age}")) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    (headers, format!("This a resource with max-age={age}\n"))
}

async fn log_request(request: axum::extract::Request, next: axum::middleware::Next) -> axum::response::Response {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    tracing::info!(method = %request.method(), uri = %request.uri(), forwarded_for = %forwarded, "Received request");
    next.run(request).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let app = Router::new()
        .route("/api/hello-world", get(hello_world))
        .route("/api/max-age", get(max_age))
        .layer(axum::middleware::from_fn(log_request));

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(address = %listener.local_addr()?, "Demo origin listening");
    axum::serve(listener, app).await?;
    Ok(())
}
