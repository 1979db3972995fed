//! Network layer subsystem.
//!
//! TCP accept loops belong to axum (plain) and axum-server (TLS); this
//! module only prepares what they need.

pub mod tls;
