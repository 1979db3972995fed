//! Inbound request wrapper used by the cache layer.

use axum::body::Body;
use axum::http::{Method, Request};

use crate::cache::directives::DirectiveSet;

/// An inbound request together with its cache directives and key.
#[derive(Debug)]
pub struct CacheRequest {
    request: Request<Body>,
    directives: DirectiveSet,
    key: String,
}

impl CacheRequest {
    /// Wrap a request, parsing its `Cache-Control` header and deriving its key.
    pub fn new(request: Request<Body>) -> Self {
        let directives = DirectiveSet::from_headers(request.headers());
        let key = cache_key(&request);
        Self {
            request,
            directives,
            key,
        }
    }

    /// Whether the cache may serve or store this request at all.
    ///
    /// Only `GET`/`HEAD` qualify, `max-age=0` opts out, and `private`
    /// requests bypass the cache entirely.
    pub fn is_cacheable(&self) -> bool {
        let method = self.request.method();
        if method != Method::GET && method != Method::HEAD {
            return false;
        }

        if self.directives.has_zero_max_age() {
            return false;
        }

        self.directives.public
    }

    pub fn directives(&self) -> &DirectiveSet {
        &self.directives
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Give back the wrapped request, e.g. to forward it.
    pub fn into_inner(self) -> Request<Body> {
        self.request
    }
}

/// Path plus query string; host, method and headers do not take part.
fn cache_key<B>(request: &Request<B>) -> String {
    request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}
