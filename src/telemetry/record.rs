//! Telemetry entities owned by the store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier correlating a request's start with its finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a new unique request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a request record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Completed,
}

/// How a record reads on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Success,
    Failure,
}

/// One inbound request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub request_id: RequestId,
    pub path: String,
    pub method: String,
    pub status: RequestStatus,
    pub status_code: Option<u16>,
    /// Bytes received from upstream (0 until success).
    pub bytes: u64,
    /// Seconds.
    pub response_time: f64,
    /// Creation time, unix seconds.
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_content: Option<String>,
}

impl RequestRecord {
    pub(crate) fn pending(request_id: RequestId, path: &str, method: &str, now: f64) -> Self {
        Self {
            request_id,
            path: path.to_string(),
            method: method.to_string(),
            status: RequestStatus::Pending,
            status_code: None,
            bytes: 0,
            response_time: 0.0,
            timestamp: now,
            error: None,
            response_content: None,
        }
    }

    pub(crate) fn mark_succeeded(&mut self, status_code: u16, bytes: u64, response_time: f64) {
        self.status = RequestStatus::Completed;
        self.status_code = Some(status_code);
        self.bytes = bytes;
        self.response_time = response_time;
    }

    pub(crate) fn mark_failed(
        &mut self,
        status_code: Option<u16>,
        error: &str,
        response_content: Option<&str>,
        response_time: f64,
    ) {
        self.status = RequestStatus::Completed;
        self.status_code = status_code;
        self.error = Some(error.to_string());
        self.response_content = response_content.map(str::to_string);
        self.response_time = response_time;
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Finalized as an error or a timeout. A later success is ignored.
    pub fn has_failed(&self) -> bool {
        self.error.is_some() || self.status_code == Some(504)
    }

    /// Finalized successfully. A later error is ignored.
    pub fn has_succeeded(&self) -> bool {
        self.error.is_none() && self.status_code.is_some_and(|code| code < 400)
    }

    pub fn outcome(&self) -> Outcome {
        if self.error.is_some() || self.status_code.is_some_and(|code| code >= 400) {
            Outcome::Failure
        } else if self.is_pending() {
            Outcome::Pending
        } else {
            Outcome::Success
        }
    }
}

/// One entry of the error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub request_id: RequestId,
    pub path: String,
    pub error: String,
    pub status_code: Option<u16>,
    pub response_content: Option<String>,
    pub timestamp: f64,
    pub response_time: f64,
}

/// Running totals for one request path.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PathAggregate {
    pub count: u64,
    pub bytes: u64,
    pub errors: u64,
    /// Seconds, incrementally averaged over successes.
    pub avg_response_time: f64,
}

impl PathAggregate {
    /// avg' = (avg * (n - 1) + sample) / n, n being the current count.
    pub(crate) fn observe_response_time(&mut self, sample: f64) {
        let n = self.count.max(1) as f64;
        self.avg_response_time = (self.avg_response_time * (n - 1.0) + sample) / n;
    }
}

/// One per-minute sample of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBucket {
    /// Unix seconds, floored to the minute.
    pub time: i64,
    pub count: u64,
}

/// Process-wide counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GlobalCounters {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    /// Unix seconds.
    pub start_time: f64,
}

impl GlobalCounters {
    pub(crate) fn started_at(start_time: f64) -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            total_bytes_sent: 0,
            total_bytes_received: 0,
            start_time,
        }
    }
}

/// Reserve room for the truncation notice when shortening captured content.
const TRUNCATION_NOTICE_RESERVE: usize = 100;

/// Decode a captured body as text and bound it to `max_chars` characters.
///
/// `total_bytes` is the full body size; a capture shorter than that is
/// reported as truncated.
pub fn bounded_content(captured: &[u8], total_bytes: u64, max_chars: usize) -> String {
    let decoded = String::from_utf8_lossy(captured);
    let char_count = decoded.chars().count();
    let truncated = char_count > max_chars || (captured.len() as u64) < total_bytes;
    if !truncated {
        return decoded.into_owned();
    }

    let keep = max_chars
        .saturating_sub(TRUNCATION_NOTICE_RESERVE)
        .min(char_count);
    if keep == 0 {
        return format!(
            "[response content of {} bytes exceeds limit of {} characters]",
            total_bytes, max_chars
        );
    }

    let mut text: String = decoded.chars().take(keep).collect();
    text.push_str(&format!(
        "\n\n[response truncated: first {} characters shown, {} bytes total]",
        keep, total_bytes
    ));
    text
}
