//! Request forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Request (from the cache layer or the server)
//!     → forward.rs (resolve upstream, clean headers)
//!     → uri.rs (compose target + request path/query)
//!     → transport.rs (single round trip: hyper or reqwest)
//!     → forward.rs relay (status → headers → streamed body)
//!     → ResponseWriter
//! ```
//!
//! # Design Decisions
//! - No retries, no load balancing: one upstream round trip per request
//! - Transport is a trait object so TLS-insecure or mock transports plug in
//! - Transport failures surface as 502, never as handler errors

pub mod forward;
pub mod transport;
pub mod uri;

pub use forward::{ForwardError, ForwardingEngine, RelayError, Upstream, UpstreamRoute};
pub use transport::{HyperTransport, ReqwestTransport, Transport, TransportError};
