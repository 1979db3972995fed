//! `Cache-Control` directive parsing.
//!
//! # Responsibilities
//! - Split a raw header value into directives
//! - Record presence of the boolean directives
//! - Parse the delta-seconds carried by `max-age`, `max-stale`, `min-fresh`
//!
//! # Design Decisions
//! - Parsing never fails: unknown tokens and non-integer values are ignored
//! - Value-bearing directives are `Option<Duration>` so "absent" and "zero"
//!   stay distinct
//! - Negative delta-seconds count as zero (never fresh, never stored);
//!   values past 2^31 saturate there (RFC 7234 §1.2.1)
//! - Lenient on purpose where exact literal tokens would reject: names
//!   compare case-insensitively and whitespace around `=` is accepted
//!   (RFC 7234 §5.2), so `MAX-AGE = 5` reads like `max-age=5`

use std::time::Duration;

use axum::http::{header, HeaderMap};

/// Largest delta-seconds value kept; bigger values saturate to it.
const MAX_DELTA_SECONDS: u64 = 1 << 31;

/// Staleness tolerance granted by a bare `max-stale` (15 years).
pub const UNBOUNDED_MAX_STALE: Duration = Duration::from_secs(15 * 365 * 24 * 60 * 60);

/// Structured view of one `Cache-Control` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectiveSet {
    /// `no-store` is present.
    pub no_store: bool,

    /// `no-cache` is present.
    pub no_cache: bool,

    /// False only when `private` is present.
    pub public: bool,

    /// `only-if-cached` is present.
    pub only_cached: bool,

    /// Freshness lifetime from `max-age`.
    pub max_age: Option<Duration>,

    /// Staleness tolerance from `max-stale`.
    pub max_stale: Option<Duration>,

    /// Required remaining freshness from `min-fresh`.
    pub min_fresh: Option<Duration>,
}

impl Default for DirectiveSet {
    fn default() -> Self {
        Self {
            no_store: false,
            no_cache: false,
            public: true,
            only_cached: false,
            max_age: None,
            max_stale: None,
            min_fresh: None,
        }
    }
}

impl DirectiveSet {
    /// Parse a raw `Cache-Control` value.
    pub fn parse(value: &str) -> Self {
        let mut directives = Self::default();

        for token in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (name, argument) = match token.split_once('=') {
                Some((name, argument)) => (name.trim(), Some(argument.trim())),
                None => (token, None),
            };

            match name.to_ascii_lowercase().as_str() {
                "no-store" => directives.no_store = true,
                "no-cache" => directives.no_cache = true,
                "public" => directives.public = true,
                "private" => directives.public = false,
                "only-if-cached" => directives.only_cached = true,
                "max-age" => {
                    if let Some(age) = argument.and_then(parse_seconds) {
                        directives.max_age = Some(age);
                    }
                }
                "max-stale" => match argument {
                    Some(argument) => {
                        if let Some(stale) = parse_seconds(argument) {
                            directives.max_stale = Some(stale);
                        }
                    }
                    None => directives.max_stale = Some(UNBOUNDED_MAX_STALE),
                },
                "min-fresh" => {
                    if let Some(fresh) = argument.and_then(parse_seconds) {
                        directives.min_fresh = Some(fresh);
                    }
                }
                _ => {}
            }
        }

        directives
    }

    /// Parse every `Cache-Control` line of a header map.
    ///
    /// Multiple lines are treated as one comma-separated list.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let joined = headers
            .get_all(header::CACHE_CONTROL)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect::<Vec<_>>()
            .join(",");

        Self::parse(&joined)
    }

    /// `max-age=0` was given.
    pub fn has_zero_max_age(&self) -> bool {
        self.max_age == Some(Duration::ZERO)
    }
}

/// Delta-seconds: an optionally signed run of digits.
fn parse_seconds(value: &str) -> Option<Duration> {
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if negative {
        return Some(Duration::ZERO);
    }

    // Only overflow can fail here.
    let secs = digits.parse::<u64>().unwrap_or(u64::MAX).min(MAX_DELTA_SECONDS);
    Some(Duration::from_secs(secs))
}
