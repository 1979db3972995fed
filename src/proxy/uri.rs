//! Outbound URL composition.
//!
//! A request for `/entities?q=test` against a target of
//! `http://origin/api?q2=test2` goes to `http://origin/api/entities?q2=test2&q=test`.

use axum::http::Uri;
use url::{Position, Url};

/// Join the target path and the inbound path with exactly one `/` between them.
///
/// The target path always ends up with a trailing slash, even when the
/// inbound path is empty.
pub fn join_paths(target: &str, request: &str) -> String {
    let mut path = String::with_capacity(target.len() + request.len() + 1);
    path.push_str(target);
    if !path.ends_with('/') {
        path.push('/');
    }
    path.push_str(request.strip_prefix('/').unwrap_or(request));
    path
}

/// Target query first, inbound query second, `&` only when both are present.
pub fn join_queries(target: &str, request: &str) -> String {
    if target.is_empty() || request.is_empty() {
        return format!("{target}{request}");
    }
    format!("{target}&{request}")
}

/// Rewrite `request` so it points at `target`.
pub fn compose(target: &Url, request: &Uri) -> Result<Uri, axum::http::Error> {
    let path = join_paths(target.path(), request.path());
    let query = join_queries(target.query().unwrap_or(""), request.query().unwrap_or(""));

    let path_and_query = if query.is_empty() {
        path
    } else {
        format!("{path}?{query}")
    };

    Uri::builder()
        .scheme(target.scheme())
        .authority(&target[Position::BeforeHost..Position::AfterPort])
        .path_and_query(path_and_query)
        .build()
}
