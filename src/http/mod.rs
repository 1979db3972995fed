//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, tower-http layers)
//!     → request.rs (request ID)
//!     → handler.rs dispatch (spawned handler task, streaming writer)
//!     → cache / proxy handlers
//!     → Send to client
//! ```

pub mod handler;
pub mod request;
pub mod server;

pub use handler::{dispatch, Handler, ResponseWriter, WriteError};
pub use request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};
