//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Exactly one upstream mode: a target URL or a route table
//! - Validate addresses, URLs, status codes and route uniqueness
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::uri::Authority;
use axum::http::StatusCode;
use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g., `upstream.target`).
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check `config` and report every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_listener(config, &mut errors);
    validate_upstream(config, &mut errors);

    for status in &config.cache.cacheable_statuses {
        if StatusCode::from_u16(*status).is_err() {
            errors.push(ValidationError::new(
                "cache.cacheable_statuses",
                format!("{status} is not a valid status code"),
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_listener(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let listener = &config.listener;
    if listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", listener.bind_address),
        ));
    }

    if let Some(tls) = &listener.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::new("listener.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::new("listener.tls.key_path", "must not be empty"));
        }
    }
}

fn validate_upstream(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let upstream = &config.upstream;

    match (&upstream.target, upstream.routes.is_empty()) {
        (Some(_), false) => errors.push(ValidationError::new(
            "upstream",
            "target and routes are mutually exclusive",
        )),
        (None, true) => errors.push(ValidationError::new(
            "upstream",
            "either a target or at least one route is required",
        )),
        _ => {}
    }

    if let Some(target) = &upstream.target {
        match Url::parse(target) {
            Ok(url) if !matches!(url.scheme(), "http" | "https") => errors.push(ValidationError::new(
                "upstream.target",
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Ok(url) if url.host_str().is_none() => {
                errors.push(ValidationError::new("upstream.target", "missing host"))
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new(
                "upstream.target",
                format!("'{target}' is not a valid URL: {e}"),
            )),
        }
    }

    let mut seen = HashSet::new();
    for (i, route) in upstream.routes.iter().enumerate() {
        let field = format!("upstream.routes[{i}]");

        if !route.path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("{field}.path"),
                format!("'{}' must start with '/'", route.path),
            ));
        }
        if !seen.insert(route.path.as_str()) {
            errors.push(ValidationError::new(
                format!("{field}.path"),
                format!("duplicate route '{}'", route.path),
            ));
        }
        if Authority::try_from(route.authority.as_str()).is_err() || route.authority.is_empty() {
            errors.push(ValidationError::new(
                format!("{field}.authority"),
                format!("'{}' is not a valid authority", route.authority),
            ));
        }
        if !matches!(route.scheme.as_str(), "http" | "https") {
            errors.push(ValidationError::new(
                format!("{field}.scheme"),
                format!("unsupported scheme '{}'", route.scheme),
            ));
        }
    }
}
