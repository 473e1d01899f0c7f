//! Response relay and error mapping.
//!
//! # Responsibilities
//! - Relay the upstream body to the client chunk by chunk
//! - Count relayed bytes and capture error bodies for telemetry
//! - Finalize the request once the relayed body is complete: the last
//!   `Content-Length` byte, the end of the stream, or immediately for
//!   responses that carry no body
//! - Map transport failures to `502 Bad Gateway`
//!
//! # Design Decisions
//! - Streaming responses are never buffered; capture is a bounded side copy
//! - A client disconnect drops the relay without finalizing; the stale
//!   request reaper times the record out later

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};

use crate::telemetry::record::bounded_content;
use crate::telemetry::{RequestId, TelemetryStore};
use crate::upstream::{UpstreamBody, UpstreamError, UpstreamResponse};

/// Upper bound of captured bytes per character kept (UTF-8 worst case).
const MAX_BYTES_PER_CHAR: usize = 4;

/// Identity of the request a relay finalizes.
#[derive(Debug, Clone)]
pub struct RelayContext {
    pub telemetry: Arc<TelemetryStore>,
    pub request_id: RequestId,
    pub path: String,
    pub method: String,
    pub started: Instant,
    /// Characters of error body kept in telemetry.
    pub max_response_content: usize,
}

struct RelayState {
    body: UpstreamBody,
    ctx: RelayContext,
    status: StatusCode,
    bytes: u64,
    /// Body length the client expects; the server stops polling once it is sent.
    expected: Option<u64>,
    captured: Vec<u8>,
    capture_limit: usize,
    finished: bool,
}

impl RelayState {
    fn new(
        body: UpstreamBody,
        ctx: RelayContext,
        status: StatusCode,
        expected: Option<u64>,
    ) -> Self {
        let capture_limit = if status.as_u16() >= 400 {
            ctx.max_response_content.saturating_mul(MAX_BYTES_PER_CHAR)
        } else {
            0
        };
        Self {
            body,
            ctx,
            status,
            bytes: 0,
            expected,
            captured: Vec::new(),
            capture_limit,
            finished: false,
        }
    }

    fn observe(&mut self, chunk: &Bytes) {
        self.bytes += chunk.len() as u64;
        let room = self.capture_limit.saturating_sub(self.captured.len());
        if room > 0 {
            let take = room.min(chunk.len());
            self.captured.extend_from_slice(&chunk[..take]);
        }
    }

    fn body_complete(&self) -> bool {
        self.expected.is_some_and(|len| self.bytes >= len)
    }

    fn captured_content(&self) -> Option<String> {
        if self.captured.is_empty() {
            return None;
        }
        Some(bounded_content(
            &self.captured,
            self.bytes,
            self.ctx.max_response_content,
        ))
    }

    /// Body fully relayed.
    fn complete(&mut self) {
        self.finished = true;
        let ctx = &self.ctx;
        let elapsed = ctx.started.elapsed().as_secs_f64();
        let code = self.status.as_u16();

        if code < 400 {
            ctx.telemetry.record_success(
                &ctx.request_id,
                &ctx.path,
                &ctx.method,
                self.bytes,
                elapsed,
                code,
            );
            tracing::debug!(
                request_id = %ctx.request_id,
                status = code,
                bytes = self.bytes,
                elapsed_secs = elapsed,
                "Relay complete"
            );
        } else {
            let content = self.captured_content();
            ctx.telemetry.record_error(
                &ctx.request_id,
                &ctx.path,
                &ctx.method,
                format!("HTTP {}", code),
                elapsed,
                content,
                Some(code),
            );
            tracing::info!(
                request_id = %ctx.request_id,
                path = %ctx.path,
                status = code,
                bytes = self.bytes,
                "Upstream returned error status"
            );
        }
    }

    /// Upstream body failed mid-stream.
    fn fail(&mut self, error: &UpstreamError) {
        self.finished = true;
        let ctx = &self.ctx;
        let elapsed = ctx.started.elapsed().as_secs_f64();

        tracing::warn!(
            request_id = %ctx.request_id,
            path = %ctx.path,
            bytes = self.bytes,
            error = %error,
            "Upstream stream failed"
        );
        let content = self.captured_content();
        ctx.telemetry.record_error(
            &ctx.request_id,
            &ctx.path,
            &ctx.method,
            format!("upstream stream failed: {}", error),
            elapsed,
            content,
            Some(self.status.as_u16()),
        );
    }
}

/// Number of body bytes the client will read, when known up front.
///
/// HEAD requests and 1xx, 204 and 304 responses have no body whatever
/// their headers say.
fn expected_body_len(method: &str, status: StatusCode, headers: &HeaderMap) -> Option<u64> {
    if method.eq_ignore_ascii_case("HEAD")
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Some(0);
    }
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Client response relaying `upstream`, finalizing telemetry when the body
/// is complete.
pub fn relay(upstream: UpstreamResponse, ctx: RelayContext) -> Response {
    let UpstreamResponse {
        status,
        headers,
        body,
    } = upstream;

    let expected = expected_body_len(&ctx.method, status, &headers);
    let mut state = RelayState::new(body, ctx, status, expected);
    if state.body_complete() {
        state.complete();
    }

    let stream = stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        match state.body.next().await {
            Some(Ok(chunk)) => {
                state.observe(&chunk);
                if state.body_complete() {
                    state.complete();
                }
                Some((Ok(chunk), state))
            }
            Some(Err(e)) => {
                state.fail(&e);
                Some((Err(e), state))
            }
            None => {
                state.complete();
                None
            }
        }
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// `502 Bad Gateway` for a request that never got a response head.
pub fn upstream_failure(error: &UpstreamError) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        format!("Upstream request failed: {}", error),
    )
        .into_response()
}
