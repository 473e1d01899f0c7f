//! Inbound request preparation.
//!
//! # Responsibilities
//! - Rebuild the `path?query` the upstream should see
//! - Produce the forwarded header set (filter, Host, overrides, X-Forwarded-For)
//! - Apply the body transform
//!
//! # Design Decisions
//! - Header steps run in a fixed order so overrides can replace Host but
//!   never the client address chain
//! - Nothing here touches telemetry; the handler records the prepared size

use std::net::IpAddr;

use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Uri};
use bytes::Bytes;

use crate::transform::{
    append_forwarded_for, filter_request_headers, process_request_body, HeaderOverrides,
};
use crate::upstream::ForwardRequest;

/// Per-process forwarding settings.
#[derive(Debug, Clone)]
pub struct ForwardSettings {
    pub preserve_host: bool,
    /// Upstream `host[:port]`.
    pub upstream_authority: String,
    pub system_prompt_replacement: Option<String>,
}

/// Path plus query string, exactly as received.
pub fn path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// Header set sent upstream.
pub fn forward_headers(
    inbound: &HeaderMap,
    client: IpAddr,
    settings: &ForwardSettings,
    overrides: &HeaderOverrides,
) -> HeaderMap {
    let mut headers = filter_request_headers(inbound, settings.preserve_host);

    if !settings.preserve_host {
        if let Ok(host) = HeaderValue::from_str(&settings.upstream_authority) {
            headers.insert(HOST, host);
        }
    }

    overrides.apply(&mut headers);
    append_forwarded_for(&mut headers, client);
    headers
}

/// Assemble the request the upstream client sends.
pub fn build_forward_request(
    parts: &Parts,
    body: Bytes,
    client: IpAddr,
    settings: &ForwardSettings,
    overrides: &HeaderOverrides,
) -> ForwardRequest {
    ForwardRequest {
        method: parts.method.clone(),
        path_and_query: path_and_query(&parts.uri),
        headers: forward_headers(&parts.headers, client, settings, overrides),
        body: process_request_body(body, settings.system_prompt_replacement.as_deref()),
    }
}
