//! HTTP caching subsystem (RFC 7234 `Cache-Control` semantics).
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → request.rs (directives.rs parses Cache-Control, derive key, cacheability gate)
//!     → middleware.rs (lookup in store.rs, freshness check on entry.rs)
//!         hit  → replay entry to client
//!         miss → origin handler writes into capture.rs
//!              → entry replayed to client
//!              → storability gate → store.rs
//! ```
//!
//! # Design Decisions
//! - Freshness is evaluated at read time; the store never expires entries
//! - A stale entry triggers a full origin fetch (no conditional revalidation)
//! - Concurrent misses for the same key are not coalesced; last writer wins
//! - The store is injected as `Arc<dyn Store>`, constructed once at startup

pub mod capture;
pub mod directives;
pub mod entry;
pub mod middleware;
pub mod request;
pub mod store;

pub use capture::ResponseCapture;
pub use directives::DirectiveSet;
pub use entry::CacheEntry;
pub use middleware::CacheHandler;
pub use request::CacheRequest;
pub use store::{MemoryStore, Store, StoreError};
