//! Header manipulation for both relay directions.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers
//! - Drop Host (unless preserved) and Content-Length on the request path
//! - Apply configured header overrides
//! - Append the client address to X-Forwarded-For
//!
//! # Design Decisions
//! - `HeaderName` is always lowercase, so comparisons are case-insensitive
//! - Every other header keeps its values and relative order

use std::collections::BTreeMap;
use std::net::IpAddr;

use axum::http::header::{CONTENT_LENGTH, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::validation::{validate_headers, ValidationError};

/// Headers meaningful only for a single transport leg.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Whether `name` is a hop-by-hop header.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Filter client headers before forwarding upstream.
pub fn filter_request_headers(headers: &HeaderMap, preserve_host: bool) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) {
            continue;
        }
        if *name == HOST && !preserve_host {
            continue;
        }
        // Body may be rewritten; the client recomputes the length.
        if *name == CONTENT_LENGTH {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Filter upstream headers before relaying to the client.
pub fn filter_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Append `client` to an existing X-Forwarded-For value, or create one.
pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let name = HeaderName::from_static(X_FORWARDED_FOR);
    let value = match headers.get(&name).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{}, {}", existing, client),
        _ => client.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(name, value);
    }
}

/// Validated header overrides, kept alongside their source map for display.
#[derive(Debug, Clone, Default)]
pub struct HeaderOverrides {
    source: BTreeMap<String, String>,
    parsed: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderOverrides {
    /// Parse a name → value map, rejecting invalid names or values.
    pub fn from_map(source: BTreeMap<String, String>) -> Result<Self, Vec<ValidationError>> {
        validate_headers(&source)?;
        let parsed = source
            .iter()
            .filter_map(|(name, value)| {
                let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
                let value = HeaderValue::from_str(value).ok()?;
                Some((name, value))
            })
            .collect();
        Ok(Self { source, parsed })
    }

    /// The overrides as configured.
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.source
    }

    /// Replace same-named headers in `headers` with the overrides.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.parsed {
            headers.insert(name.clone(), value.clone());
        }
    }
}
