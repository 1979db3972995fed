//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): client requests by method, status
//! - `proxy_request_duration_seconds` (histogram): client-facing latency
//! - `proxy_cache_lookups_total` (counter): lookups by outcome
//! - `proxy_cache_stores_total` (counter): entries written to the store
//! - `proxy_cache_store_errors_total` (counter): failed store operations by op
//! - `proxy_cache_entries` (gauge): entries held by the in-memory store
//! - `proxy_upstream_requests_total` (counter): origin round trips by status
//! - `proxy_upstream_errors_total` (counter): failed round trips by kind
//! - `proxy_upstream_duration_seconds` (histogram): origin latency to first byte
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - The Prometheus exporter serves its own scrape listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and start its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a completed client request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(outcome: &'static str) {
    metrics::counter!("proxy_cache_lookups_total", "outcome" => outcome).increment(1);
}

pub fn record_cache_store() {
    metrics::counter!("proxy_cache_stores_total").increment(1);
}

pub fn record_cache_store_error(op: &'static str) {
    metrics::counter!("proxy_cache_store_errors_total", "op" => op).increment(1);
}

pub fn record_cache_size(entries: usize) {
    metrics::gauge!("proxy_cache_entries").set(entries as f64);
}

/// Record an origin round trip that produced a response head.
pub fn record_upstream(status: u16, start: Instant) {
    metrics::counter!("proxy_upstream_requests_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("proxy_upstream_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    metrics::counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
}
