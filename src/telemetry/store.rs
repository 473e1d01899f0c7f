//! Shared telemetry state and the request lifecycle API.
//!
//! # Responsibilities
//! - Own counters, ring buffers, per-path aggregates and per-minute series
//! - Record request start and the first effective finalization
//! - Provide consistent snapshots for the reaper and the query layer
//!
//! # Design Decisions
//! - One mutex guards everything; every critical section is synchronous and short
//! - Success skips records already failed, error skips records already succeeded;
//!   whichever finalizer takes the lock first wins
//! - Records missing from the ring (evicted) are re-appended as completed

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::config::TelemetryConfig;
use crate::observability::metrics;
use crate::telemetry::buffer::BoundedBuffer;
use crate::telemetry::record::{
    ErrorEntry, GlobalCounters, PathAggregate, RequestId, RequestRecord, TimeBucket,
};
use crate::telemetry::unix_now;

/// Result of a finalization call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    /// Counters and the record were updated.
    Applied,
    /// The record was already finalized with the opposite outcome.
    Skipped,
}

impl Finalization {
    pub fn is_applied(self) -> bool {
        self == Finalization::Applied
    }
}

/// A pending record old enough to be timed out.
#[derive(Debug, Clone)]
pub struct StaleRequest {
    pub request_id: RequestId,
    pub path: String,
    pub method: String,
    /// Seconds since the request started.
    pub age: f64,
}

/// Per-minute series, one bucket per sample.
#[derive(Debug, Clone)]
pub(crate) struct TimeSeries {
    pub(crate) requests_per_minute: BoundedBuffer<TimeBucket>,
    pub(crate) errors_per_minute: BoundedBuffer<TimeBucket>,
    pub(crate) bytes_per_minute: BoundedBuffer<TimeBucket>,
}

impl TimeSeries {
    fn new(capacity: usize) -> Self {
        Self {
            requests_per_minute: BoundedBuffer::new(capacity),
            errors_per_minute: BoundedBuffer::new(capacity),
            bytes_per_minute: BoundedBuffer::new(capacity),
        }
    }
}

/// Everything guarded by the store's lock.
#[derive(Debug)]
pub(crate) struct StoreState {
    pub(crate) counters: GlobalCounters,
    pub(crate) recent: BoundedBuffer<RequestRecord>,
    pub(crate) errors: BoundedBuffer<ErrorEntry>,
    pub(crate) paths: HashMap<String, PathAggregate>,
    pub(crate) series: TimeSeries,
}

/// Telemetry store shared by the proxy pipeline, background tasks and admin API.
#[derive(Debug)]
pub struct TelemetryStore {
    state: Mutex<StoreState>,
}

impl TelemetryStore {
    /// Create a store sized from configuration.
    pub fn new(config: &TelemetryConfig) -> Self {
        Self::with_capacities(
            config.recent_capacity,
            config.error_capacity,
            config.series_capacity,
        )
    }

    /// Create a store with explicit ring capacities.
    pub fn with_capacities(recent: usize, errors: usize, series: usize) -> Self {
        Self {
            state: Mutex::new(StoreState {
                counters: GlobalCounters::started_at(unix_now()),
                recent: BoundedBuffer::new(recent),
                errors: BoundedBuffer::new(errors),
                paths: HashMap::new(),
                series: TimeSeries::new(series),
            }),
        }
    }

    /// Record a new inbound request and return its ID.
    pub fn record_start(&self, path: &str, method: &str, bytes_sent: u64) -> RequestId {
        self.record_start_at(path, method, bytes_sent, unix_now())
    }

    pub(crate) fn record_start_at(
        &self,
        path: &str,
        method: &str,
        bytes_sent: u64,
        now: f64,
    ) -> RequestId {
        let request_id = RequestId::new();
        let mut state = self.state.lock();

        state.counters.total_requests += 1;
        state.counters.total_bytes_sent += bytes_sent;

        let aggregate = state.paths.entry(path.to_string()).or_default();
        aggregate.count += 1;
        aggregate.bytes += bytes_sent;

        state
            .recent
            .push(RequestRecord::pending(request_id, path, method, now));

        request_id
    }

    /// Finalize a request as successful.
    ///
    /// No-op when the record is already finalized as an error or timeout.
    pub fn record_success(
        &self,
        request_id: &RequestId,
        path: &str,
        method: &str,
        bytes_received: u64,
        response_time: f64,
        status_code: u16,
    ) -> Finalization {
        let now = unix_now();
        let outcome = {
            let mut state = self.state.lock();
            let state = &mut *state;

            let outcome = match state.recent.find_latest_mut(|r| r.request_id == *request_id) {
                Some(record) if record.has_failed() => Finalization::Skipped,
                Some(record) => {
                    record.mark_succeeded(status_code, bytes_received, response_time);
                    Finalization::Applied
                }
                None => {
                    let mut record = RequestRecord::pending(*request_id, path, method, now);
                    record.mark_succeeded(status_code, bytes_received, response_time);
                    state.recent.push(record);
                    Finalization::Applied
                }
            };

            if outcome.is_applied() {
                state.counters.successful_requests += 1;
                state.counters.total_bytes_received += bytes_received;
                state
                    .paths
                    .entry(path.to_string())
                    .or_default()
                    .observe_response_time(response_time);
            }
            outcome
        };

        if !outcome.is_applied() {
            tracing::debug!(
                request_id = %request_id,
                status = status_code,
                "Ignoring success for request already finalized as failed"
            );
            metrics::record_finalization_skipped("success");
        }
        outcome
    }

    /// Finalize a request as failed.
    ///
    /// No-op when the record is already finalized successfully.
    #[allow(clippy::too_many_arguments)]
    pub fn record_error(
        &self,
        request_id: &RequestId,
        path: &str,
        method: &str,
        error: impl Into<String>,
        response_time: f64,
        response_content: Option<String>,
        status_code: Option<u16>,
    ) -> Finalization {
        let error = error.into();
        let now = unix_now();
        let outcome = {
            let mut state = self.state.lock();
            let state = &mut *state;

            let outcome = match state.recent.find_latest_mut(|r| r.request_id == *request_id) {
                Some(record) if record.has_succeeded() => Finalization::Skipped,
                Some(record) => {
                    record.mark_failed(status_code, &error, response_content.as_deref(), response_time);
                    Finalization::Applied
                }
                None => {
                    let mut record = RequestRecord::pending(*request_id, path, method, now);
                    record.mark_failed(status_code, &error, response_content.as_deref(), response_time);
                    state.recent.push(record);
                    Finalization::Applied
                }
            };

            if outcome.is_applied() {
                state.counters.failed_requests += 1;
                state.paths.entry(path.to_string()).or_default().errors += 1;
                state.errors.push(ErrorEntry {
                    request_id: *request_id,
                    path: path.to_string(),
                    error,
                    status_code,
                    response_content,
                    timestamp: now,
                    response_time,
                });
            }
            outcome
        };

        if !outcome.is_applied() {
            tracing::debug!(
                request_id = %request_id,
                "Ignoring error for request already finalized as successful"
            );
            metrics::record_finalization_skipped("error");
        }
        outcome
    }

    /// Append one bucket per series covering the trailing minute.
    pub fn update_time_window(&self) {
        self.update_time_window_at(unix_now());
    }

    pub(crate) fn update_time_window_at(&self, now: f64) {
        let minute = (now / 60.0).floor() as i64 * 60;
        let window_start = now - 60.0;

        let mut state = self.state.lock();
        let state = &mut *state;

        let (mut requests, mut errors, mut bytes) = (0u64, 0u64, 0u64);
        for record in state.recent.iter().filter(|r| r.timestamp > window_start) {
            requests += 1;
            if record.error.is_some() || record.status_code.is_some_and(|c| c >= 400) {
                errors += 1;
            }
            bytes += record.bytes;
        }

        let series = &mut state.series;
        series.requests_per_minute.push(TimeBucket { time: minute, count: requests });
        series.errors_per_minute.push(TimeBucket { time: minute, count: errors });
        series.bytes_per_minute.push(TimeBucket { time: minute, count: bytes });
    }

    /// Pending records older than `max_age` seconds at `now`.
    pub fn stale_pending(&self, now: f64, max_age: f64) -> Vec<StaleRequest> {
        let state = self.state.lock();
        state
            .recent
            .iter()
            .filter(|r| r.is_pending() && now - r.timestamp > max_age)
            .map(|r| StaleRequest {
                request_id: r.request_id,
                path: r.path.clone(),
                method: r.method.clone(),
                age: now - r.timestamp,
            })
            .collect()
    }

    /// Snapshot of the global counters.
    pub fn counters(&self) -> GlobalCounters {
        self.state.lock().counters
    }

    /// Copy of the retained record for `request_id`, if any.
    pub fn record(&self, request_id: &RequestId) -> Option<RequestRecord> {
        let state = self.state.lock();
        state
            .recent
            .iter()
            .rev()
            .find(|r| r.request_id == *request_id)
            .cloned()
    }

    /// Number of records still awaiting finalization.
    pub fn pending_count(&self) -> usize {
        self.state.lock().recent.iter().filter(|r| r.is_pending()).count()
    }

    /// Run `f` against the locked state. `f` must not block.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        let state = self.state.lock();
        f(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::record::RequestStatus;

    fn store() -> TelemetryStore {
        TelemetryStore::with_capacities(1000, 500, 1440)
    }

    #[test]
    fn start_counts_request_and_bytes() {
        let store = store();
        let id = store.record_start("/p", "GET", 10);

        let counters = store.counters();
        assert_eq!(counters.total_requests, 1);
        assert_eq!(counters.total_bytes_sent, 10);
        assert_eq!(store.pending_count(), 1);

        let record = store.record(&id).unwrap();
        assert!(record.is_pending());
        assert_eq!(record.path, "/p");
        assert_eq!(record.status_code, None);

        store.read(|s| {
            let agg = s.paths["/p"];
            assert_eq!(agg.count, 1);
            assert_eq!(agg.bytes, 10);
        });
    }

    #[test]
    fn error_then_success_keeps_error() {
        let store = store();
        let id = store.record_start("/p", "GET", 10);

        let first = store.record_error(&id, "/p", "GET", "HTTP 500", 0.2, None, Some(500));
        let second = store.record_success(&id, "/p", "GET", 99, 0.3, 200);
        assert_eq!(first, Finalization::Applied);
        assert_eq!(second, Finalization::Skipped);

        let record = store.record(&id).unwrap();
        assert_eq!(record.status, RequestStatus::Completed);
        assert_eq!(record.status_code, Some(500));
        assert_eq!(record.bytes, 0);

        let counters = store.counters();
        assert_eq!(counters.failed_requests, 1);
        assert_eq!(counters.successful_requests, 0);
        assert_eq!(counters.total_bytes_received, 0);
    }

    #[test]
    fn success_then_error_keeps_success() {
        let store = store();
        let id = store.record_start("/p", "POST", 5);

        assert!(store.record_success(&id, "/p", "POST", 64, 0.5, 200).is_applied());
        assert!(!store
            .record_error(&id, "/p", "POST", "late", 0.6, None, Some(502))
            .is_applied());

        let record = store.record(&id).unwrap();
        assert_eq!(record.status_code, Some(200));
        assert!(record.error.is_none());

        let counters = store.counters();
        assert_eq!(counters.successful_requests, 1);
        assert_eq!(counters.failed_requests, 0);
        assert_eq!(counters.total_bytes_received, 64);
        store.read(|s| {
            assert!(s.errors.is_empty());
            assert_eq!(s.paths["/p"].errors, 0);
        });
    }

    #[test]
    fn success_updates_path_average() {
        let store = store();
        let a = store.record_start("/p", "GET", 0);
        store.record_success(&a, "/p", "GET", 1, 1.0, 200);
        let b = store.record_start("/p", "GET", 0);
        store.record_success(&b, "/p", "GET", 1, 3.0, 200);

        store.read(|s| {
            let agg = s.paths["/p"];
            assert_eq!(agg.count, 2);
            assert!((agg.avg_response_time - 2.0).abs() < 1e-9);
        });
    }

    #[test]
    fn error_appends_log_entry() {
        let store = store();
        let id = store.record_start("/v1/messages", "POST", 3);
        store.record_error(
            &id,
            "/v1/messages",
            "POST",
            "HTTP 429",
            0.1,
            Some("rate limited".into()),
            Some(429),
        );

        store.read(|s| {
            assert_eq!(s.errors.len(), 1);
            let entry = s.errors.iter().next().unwrap();
            assert_eq!(entry.request_id, id);
            assert_eq!(entry.status_code, Some(429));
            assert_eq!(entry.response_content.as_deref(), Some("rate limited"));
            assert_eq!(s.paths["/v1/messages"].errors, 1);
        });
        let record = store.record(&id).unwrap();
        assert_eq!(record.error.as_deref(), Some("HTTP 429"));
    }

    #[test]
    fn evicted_record_is_reappended_on_finalize() {
        let store = TelemetryStore::with_capacities(2, 10, 10);
        let first = store.record_start("/a", "GET", 0);
        store.record_start("/b", "GET", 0);
        store.record_start("/c", "GET", 0);
        assert!(store.record(&first).is_none());

        assert!(store.record_success(&first, "/a", "GET", 7, 0.1, 200).is_applied());
        let record = store.record(&first).unwrap();
        assert_eq!(record.status, RequestStatus::Completed);
        assert_eq!(record.bytes, 7);
        assert_eq!(store.counters().successful_requests, 1);
    }

    #[test]
    fn ring_keeps_newest_thousand_in_order() {
        let store = store();
        let ids: Vec<_> = (0..1001)
            .map(|i| store.record_start_at("/p", "GET", 0, i as f64))
            .collect();

        store.read(|s| {
            assert_eq!(s.recent.len(), 1000);
            let kept: Vec<_> = s.recent.iter().map(|r| r.request_id).collect();
            assert_eq!(kept, ids[1..].to_vec());
            let timestamps: Vec<_> = s.recent.iter().map(|r| r.timestamp).collect();
            assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(timestamps[0], 1.0);
        });
        assert!(store.record(&ids[0]).is_none());
        assert_eq!(store.counters().total_requests, 1001);
    }

    #[test]
    fn time_window_counts_trailing_minute() {
        let store = store();
        let now = 1_700_000_030.0;
        let old = store.record_start_at("/p", "GET", 0, now - 120.0);
        let ok = store.record_start_at("/p", "GET", 0, now - 10.0);
        let bad = store.record_start_at("/p", "GET", 0, now - 5.0);
        store.record_success(&old, "/p", "GET", 1000, 0.1, 200);
        store.record_success(&ok, "/p", "GET", 40, 0.1, 200);
        store.record_error(&bad, "/p", "GET", "HTTP 500", 0.1, None, Some(500));

        store.update_time_window_at(now);

        store.read(|s| {
            let requests = s.series.requests_per_minute.iter().last().copied().unwrap();
            let errors = s.series.errors_per_minute.iter().last().copied().unwrap();
            let bytes = s.series.bytes_per_minute.iter().last().copied().unwrap();
            assert_eq!(requests.time, 1_699_999_980);
            assert_eq!(errors.time, requests.time);
            assert_eq!(requests.count, 2);
            assert_eq!(errors.count, 1);
            assert_eq!(bytes.count, 40);
        });
    }

    #[test]
    fn stale_pending_snapshot() {
        let store = store();
        let now = 10_000.0;
        let stale = store.record_start_at("/slow", "POST", 0, now - 301.0);
        store.record_start_at("/fresh", "POST", 0, now - 10.0);
        let done = store.record_start_at("/done", "GET", 0, now - 400.0);
        store.record_success(&done, "/done", "GET", 0, 0.1, 200);

        let found = store.stale_pending(now, 300.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].request_id, stale);
        assert_eq!(found[0].path, "/slow");
        assert!((found[0].age - 301.0).abs() < 1e-9);
    }

    #[test]
    fn racing_finalizers_apply_once_per_request() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Barrier;

        const REQUESTS: usize = 2_000;
        const WORKERS: usize = 4;
        const BACKGROUND: usize = 500;

        let store = TelemetryStore::with_capacities(REQUESTS + 2 * BACKGROUND + 1, REQUESTS + 1, 10);
        let ids: Vec<RequestId> = (0..REQUESTS)
            .map(|_| store.record_start("/v1/messages", "POST", 1))
            .collect();

        let successes = AtomicUsize::new(0);
        let errors = AtomicUsize::new(0);
        let barrier = Barrier::new(WORKERS * 2 + 2);

        std::thread::scope(|scope| {
            for chunk in ids.chunks(REQUESTS / WORKERS) {
                let (store, barrier, successes, errors) = (&store, &barrier, &successes, &errors);
                scope.spawn(move || {
                    barrier.wait();
                    for id in chunk {
                        if store.record_success(id, "/v1/messages", "POST", 10, 0.05, 200).is_applied() {
                            successes.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
                scope.spawn(move || {
                    barrier.wait();
                    for id in chunk.iter().rev() {
                        let outcome = store.record_error(
                            id,
                            "/v1/messages",
                            "POST",
                            "request timed out after 300s",
                            300.0,
                            None,
                            Some(504),
                        );
                        if outcome.is_applied() {
                            errors.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
            for _ in 0..2 {
                let (store, barrier) = (&store, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    for _ in 0..BACKGROUND {
                        store.record_start("/v1/models", "GET", 0);
                    }
                });
            }
        });

        let successes = successes.into_inner();
        let errors = errors.into_inner();
        assert_eq!(successes + errors, REQUESTS);

        let counters = store.counters();
        assert_eq!(counters.successful_requests as usize, successes);
        assert_eq!(counters.failed_requests as usize, errors);
        assert_eq!(counters.total_requests as usize, REQUESTS + 2 * BACKGROUND);
        assert_eq!(store.pending_count(), 2 * BACKGROUND);

        for id in &ids {
            let record = store.record(id).unwrap();
            assert!(!record.is_pending());
            assert_ne!(record.has_succeeded(), record.has_failed());
        }
        store.read(|s| {
            assert_eq!(s.errors.len(), errors);
            assert_eq!(s.paths["/v1/messages"].errors as usize, errors);
        });
    }
}
