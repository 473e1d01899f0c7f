//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Name every proxy metric in one place
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `proxy_requests_total` (counter): proxied requests by method, status
//! - `proxy_request_duration_seconds` (histogram): time to response headers
//! - `proxy_upstream_failures_total` (counter): transport failures by kind
//! - `proxy_finalizations_skipped_total` (counter): late finalizers ignored
//! - `proxy_stale_requests_reaped_total` (counter): timeouts issued by the reaper
//! - `proxy_body_rewrites_total` (counter): body rewrite results

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const REQUESTS_TOTAL: &str = "proxy_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "proxy_request_duration_seconds";
pub const UPSTREAM_FAILURES_TOTAL: &str = "proxy_upstream_failures_total";
pub const FINALIZATIONS_SKIPPED_TOTAL: &str = "proxy_finalizations_skipped_total";
pub const STALE_REQUESTS_REAPED_TOTAL: &str = "proxy_stale_requests_reaped_total";
pub const BODY_REWRITES_TOTAL: &str = "proxy_body_rewrites_total";

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// One relayed request, measured up to the response head.
pub fn record_request(method: &str, status: u16, duration_secs: f64) {
    metrics::counter!(REQUESTS_TOTAL,
        "method" => method.to_owned(),
        "status" => status.to_string(),
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS).record(duration_secs);
}

pub fn record_upstream_failure(kind: &'static str) {
    metrics::counter!(UPSTREAM_FAILURES_TOTAL, "kind" => kind).increment(1);
}

/// `outcome` is the finalizer that lost: "success" or "error".
pub fn record_finalization_skipped(outcome: &'static str) {
    metrics::counter!(FINALIZATIONS_SKIPPED_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_stale_reaped(count: usize) {
    metrics::counter!(STALE_REQUESTS_REAPED_TOTAL).increment(count as u64);
}

pub fn record_body_rewrite(result: &'static str) {
    metrics::counter!(BODY_REWRITES_TOTAL, "result" => result).increment(1);
}
