//! HTTP reverse proxy with an optional RFC 7234 caching layer.

// Core subsystems
pub mod cache;
pub mod config;
pub mod http;
pub mod net;
pub mod proxy;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use cache::{CacheHandler, MemoryStore, Store};
pub use config::schema::ProxyConfig;
pub use http::{Handler, HttpServer, ResponseWriter};
pub use lifecycle::Shutdown;
pub use proxy::ForwardingEngine;
