//! Read-only views over the telemetry store.
//!
//! # Responsibilities
//! - Time-filter records, error entries and per-minute buckets
//! - Percentiles, top paths, QPS and human-readable byte sizes
//! - Assemble the dashboard stats and errors reports
//!
//! # Design Decisions
//! - Filtering copies out of the store under one short lock; all math
//!   runs after the lock is released
//! - Range bounds are inclusive; a missing (or zero) bound defaults to the
//!   trailing hour

use serde::{Deserialize, Serialize, Serializer};

use crate::telemetry::buffer::BoundedBuffer;
use crate::telemetry::record::{
    ErrorEntry, Outcome, PathAggregate, RequestId, RequestRecord, TimeBucket,
};
use crate::telemetry::store::TelemetryStore;
use crate::telemetry::unix_now;

/// Window used when the caller gives no start time.
pub const DEFAULT_WINDOW_SECS: f64 = 3600.0;

const TOP_PATHS: usize = 10;
const TOP_ERROR_PATHS: usize = 10;

/// Inclusive `[start, end]` range in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn resolve(start: Option<f64>, end: Option<f64>, now: f64) -> Self {
        let start = start.filter(|t| *t != 0.0).unwrap_or(now - DEFAULT_WINDOW_SECS);
        let end = end.filter(|t| *t != 0.0).unwrap_or(now);
        Self { start, end }
    }

    pub fn contains(&self, timestamp: f64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

/// Per-minute buckets inside a range.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimeSeriesView {
    pub requests_per_minute: Vec<TimeBucket>,
    pub errors_per_minute: Vec<TimeBucket>,
    pub bytes_per_minute: Vec<TimeBucket>,
}

/// Copies of everything retained inside a range, oldest first.
#[derive(Debug, Clone, Default)]
pub struct FilteredView {
    pub requests: Vec<RequestRecord>,
    pub errors: Vec<ErrorEntry>,
    pub time_series: TimeSeriesView,
}

pub fn time_filtered_view(store: &TelemetryStore, range: TimeRange) -> FilteredView {
    store.read(|state| {
        let buckets = |series: &BoundedBuffer<TimeBucket>| {
            series
                .iter()
                .filter(|b| range.contains(b.time as f64))
                .copied()
                .collect::<Vec<_>>()
        };

        FilteredView {
            requests: state
                .recent
                .iter()
                .filter(|r| range.contains(r.timestamp))
                .cloned()
                .collect(),
            errors: state
                .errors
                .iter()
                .filter(|e| range.contains(e.timestamp))
                .cloned()
                .collect(),
            time_series: TimeSeriesView {
                requests_per_minute: buckets(&state.series.requests_per_minute),
                errors_per_minute: buckets(&state.series.errors_per_minute),
                bytes_per_minute: buckets(&state.series.bytes_per_minute),
            },
        }
    })
}

/// Nearest-rank percentiles: the value at index ⌊p·n/100⌋ of the sorted
/// input, clamped to the last element. Empty input yields 0 for every p.
pub fn percentiles(values: &[f64], ps: &[u32]) -> Vec<f64> {
    if values.is_empty() {
        return vec![0.0; ps.len()];
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();

    ps.iter()
        .map(|&p| {
            let index = (p as usize * n / 100).min(n - 1);
            sorted[index]
        })
        .collect()
}

/// Paths with at least one request, busiest first.
pub fn top_paths(store: &TelemetryStore, n: usize) -> Vec<(String, PathAggregate)> {
    let mut paths: Vec<(String, PathAggregate)> = store.read(|state| {
        state
            .paths
            .iter()
            .filter(|(_, agg)| agg.count > 0)
            .map(|(path, agg)| (path.clone(), *agg))
            .collect()
    });
    paths.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(&b.0)));
    paths.truncate(n);
    paths
}

/// Requests per second over `[start, end]`; 0 for an empty or inverted window.
pub fn qps(count: usize, start: f64, end: f64) -> f64 {
    let window = end - start;
    if window > 0.0 {
        count as f64 / window
    } else {
        0.0
    }
}

/// Human-readable size with one decimal, scaling by 1024.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} PB", value)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Serializes `(key, value)` pairs as a JSON object, keeping their order.
#[derive(Debug, Clone, Default)]
pub struct Ranked<T>(pub Vec<(String, T)>);

impl<T: Serialize> Serialize for Ranked<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

// ---------------------------------------------------------------------------
// Stats report
// ---------------------------------------------------------------------------

fn default_stats_limit() -> usize {
    100
}

/// Parameters of a stats report. A `limit` of 0 returns every record.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsQuery {
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    #[serde(default = "default_stats_limit")]
    pub limit: usize,
}

impl Default for StatsQuery {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            limit: default_stats_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub success_rate: f64,
    /// Milliseconds.
    pub avg_response_time: f64,
    pub requests_per_second: f64,
    pub total_bytes_sent: u64,
    pub total_bytes_sent_formatted: String,
    pub uptime_seconds: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResponseTimePercentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Performance {
    pub response_time_ms: ResponseTimePercentiles,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PathSummary {
    pub count: u64,
    pub bytes: u64,
    pub errors: u64,
    /// Milliseconds, two decimals.
    pub avg_response_time: f64,
    pub success_rate: f64,
}

impl From<PathAggregate> for PathSummary {
    fn from(agg: PathAggregate) -> Self {
        let success_rate = if agg.count > 0 {
            agg.count.saturating_sub(agg.errors) as f64 / agg.count as f64
        } else {
            1.0
        };
        Self {
            count: agg.count,
            bytes: agg.bytes,
            errors: agg.errors,
            avg_response_time: round2(agg.avg_response_time * 1000.0),
            success_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub summary: StatsSummary,
    pub performance: Performance,
    pub time_series: TimeSeriesView,
    pub top_paths: Ranked<PathSummary>,
    pub recent_requests: Vec<RequestRecord>,
}

pub fn get_stats(store: &TelemetryStore, query: &StatsQuery) -> StatsReport {
    get_stats_at(store, query, unix_now())
}

pub(crate) fn get_stats_at(store: &TelemetryStore, query: &StatsQuery, now: f64) -> StatsReport {
    let range = TimeRange::resolve(query.start_time, query.end_time, now);
    let FilteredView {
        requests,
        time_series,
        ..
    } = time_filtered_view(store, range);
    let start_time = store.counters().start_time;

    let total = requests.len();
    let successful = requests
        .iter()
        .filter(|r| r.outcome() == Outcome::Success)
        .count();
    let failed = requests
        .iter()
        .filter(|r| r.outcome() == Outcome::Failure)
        .count();

    let response_times: Vec<f64> = requests
        .iter()
        .filter(|r| r.response_time > 0.0)
        .map(|r| r.response_time * 1000.0)
        .collect();
    let avg_response_time = if response_times.is_empty() {
        0.0
    } else {
        response_times.iter().sum::<f64>() / response_times.len() as f64
    };
    let pct = percentiles(&response_times, &[50, 95, 99]);
    let (p50, p95, p99) = (pct[0], pct[1], pct[2]);

    let total_bytes_sent: u64 = requests.iter().map(|r| r.bytes).sum();

    let top_paths = Ranked(
        top_paths(store, TOP_PATHS)
            .into_iter()
            .map(|(path, agg)| (path, PathSummary::from(agg)))
            .collect(),
    );

    let recent_requests = if query.limit > 0 && requests.len() > query.limit {
        requests[requests.len() - query.limit..].to_vec()
    } else {
        requests
    };

    StatsReport {
        summary: StatsSummary {
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            success_rate: if total > 0 {
                successful as f64 / total as f64
            } else {
                1.0
            },
            avg_response_time,
            requests_per_second: qps(total, range.start, range.end),
            total_bytes_sent,
            total_bytes_sent_formatted: format_bytes(total_bytes_sent),
            uptime_seconds: now - start_time,
        },
        performance: Performance {
            response_time_ms: ResponseTimePercentiles { p50, p95, p99 },
        },
        time_series,
        top_paths,
        recent_requests,
    }
}

// ---------------------------------------------------------------------------
// Errors report
// ---------------------------------------------------------------------------

fn default_errors_limit() -> usize {
    50
}

/// Parameters of an errors report. A `limit` of 0 disables pagination.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorsQuery {
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    #[serde(default = "default_errors_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    /// Case-insensitive substring matched against the path.
    pub path_filter: Option<String>,
}

impl Default for ErrorsQuery {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            limit: default_errors_limit(),
            offset: 0,
            path_filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorView {
    pub request_id: RequestId,
    pub path: String,
    pub error: String,
    pub status_code: Option<u16>,
    pub timestamp: f64,
    pub formatted_time: String,
    /// Milliseconds, two decimals.
    pub response_time: f64,
    pub response_content: Option<String>,
}

impl From<ErrorEntry> for ErrorView {
    fn from(entry: ErrorEntry) -> Self {
        Self {
            formatted_time: format_timestamp(entry.timestamp),
            response_time: round2(entry.response_time * 1000.0),
            request_id: entry.request_id,
            path: entry.path,
            error: entry.error,
            status_code: entry.status_code,
            timestamp: entry.timestamp,
            response_content: entry.response_content,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorStatistics {
    pub total_errors: usize,
    pub total_requests: usize,
    pub error_rate: f64,
    pub errors_by_path: Ranked<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorsReport {
    pub errors: Vec<ErrorView>,
    pub pagination: Pagination,
    pub statistics: ErrorStatistics,
}

pub fn get_errors(store: &TelemetryStore, query: &ErrorsQuery) -> ErrorsReport {
    get_errors_at(store, query, unix_now())
}

pub(crate) fn get_errors_at(store: &TelemetryStore, query: &ErrorsQuery, now: f64) -> ErrorsReport {
    let range = TimeRange::resolve(query.start_time, query.end_time, now);
    let FilteredView {
        requests, errors, ..
    } = time_filtered_view(store, range);

    let errors: Vec<ErrorEntry> = match query.path_filter.as_deref().filter(|f| !f.is_empty()) {
        Some(filter) => {
            let needle = filter.to_lowercase();
            errors
                .into_iter()
                .filter(|e| e.path.to_lowercase().contains(&needle))
                .collect()
        }
        None => errors,
    };

    let total_errors = errors.len();
    let total_requests = requests.len();

    let mut by_path: Vec<(String, usize)> = Vec::new();
    for entry in &errors {
        match by_path.iter_mut().find(|(path, _)| *path == entry.path) {
            Some((_, count)) => *count += 1,
            None => by_path.push((entry.path.clone(), 1)),
        }
    }
    // Stable sort keeps first-seen order among equal counts.
    by_path.sort_by(|a, b| b.1.cmp(&a.1));
    by_path.truncate(TOP_ERROR_PATHS);

    let page: Vec<ErrorView> = if query.limit > 0 {
        errors
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(ErrorView::from)
            .collect()
    } else {
        errors.into_iter().map(ErrorView::from).collect()
    };

    ErrorsReport {
        errors: page,
        pagination: Pagination {
            total: total_errors,
            limit: query.limit,
            offset: query.offset,
            has_more: query.offset + query.limit < total_errors,
        },
        statistics: ErrorStatistics {
            total_errors,
            total_requests,
            error_rate: if total_requests > 0 {
                total_errors as f64 / total_requests as f64
            } else {
                0.0
            },
            errors_by_path: Ranked(by_path),
        },
    }
}

/// Local wall-clock rendering, `YYYY-MM-DD HH:MM:SS`.
fn format_timestamp(timestamp: f64) -> String {
    let secs = timestamp.floor() as i64;
    let nanos = ((timestamp - timestamp.floor()) * 1e9) as u32;
    chrono::DateTime::from_timestamp(secs, nanos)
        .map(|utc| {
            utc.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TelemetryStore {
        TelemetryStore::with_capacities(1000, 500, 1440)
    }

    #[test]
    fn format_bytes_scales() {
        assert_eq!(format_bytes(0), "0.0 B");
        assert_eq!(format_bytes(500), "500.0 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(2 * 1024u64.pow(4)), "2.0 TB");
        assert_eq!(format_bytes(3 * 1024u64.pow(5)), "3.0 PB");
    }

    #[test]
    fn percentiles_of_empty_input_are_zero() {
        assert_eq!(percentiles(&[], &[50, 95, 99]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn percentiles_use_floor_index() {
        let values: Vec<f64> = (1..=10).rev().map(f64::from).collect();
        assert_eq!(percentiles(&values, &[50, 95, 99]), vec![6.0, 10.0, 10.0]);
        assert_eq!(percentiles(&values, &[0, 100]), vec![1.0, 10.0]);
    }

    #[test]
    fn qps_guards_empty_window() {
        assert_eq!(qps(10, 100.0, 100.0), 0.0);
        assert_eq!(qps(10, 200.0, 100.0), 0.0);
        assert_eq!(qps(120, 0.0, 60.0), 2.0);
    }

    #[test]
    fn range_defaults_to_trailing_hour() {
        let range = TimeRange::resolve(None, None, 10_000.0);
        assert_eq!(range, TimeRange { start: 6_400.0, end: 10_000.0 });
        let range = TimeRange::resolve(Some(0.0), Some(9_000.0), 10_000.0);
        assert_eq!(range.start, 6_400.0);
        assert_eq!(range.end, 9_000.0);
        assert!(range.contains(9_000.0));
        assert!(!range.contains(9_000.5));
    }

    #[test]
    fn filtered_view_is_inclusive() {
        let store = store();
        store.record_start_at("/a", "GET", 0, 100.0);
        store.record_start_at("/b", "GET", 0, 200.0);
        store.record_start_at("/c", "GET", 0, 300.0);

        let view = time_filtered_view(&store, TimeRange { start: 100.0, end: 200.0 });
        let paths: Vec<_> = view.requests.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/b"]);
    }

    #[test]
    fn top_paths_orders_by_count() {
        let store = store();
        for _ in 0..3 {
            store.record_start("/busy", "GET", 0);
        }
        store.record_start("/quiet", "GET", 0);
        for _ in 0..2 {
            store.record_start("/mid", "GET", 0);
        }

        let top = top_paths(&store, 2);
        let names: Vec<_> = top.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(names, vec!["/busy", "/mid"]);
        assert_eq!(top[0].1.count, 3);
    }

    #[test]
    fn stats_report_summarizes_window() {
        let store = store();
        let now = store.counters().start_time + 10.0;

        let ok = store.record_start_at("/v1/messages", "POST", 10, now - 5.0);
        store.record_success(&ok, "/v1/messages", "POST", 2048, 0.2, 200);
        let bad = store.record_start_at("/v1/messages", "POST", 10, now - 4.0);
        store.record_error(&bad, "/v1/messages", "POST", "HTTP 500", 0.4, None, Some(500));
        store.record_start_at("/v1/models", "GET", 0, now - 3.0);

        let report = get_stats_at(&store, &StatsQuery::default(), now);
        let summary = &report.summary;
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.successful_requests, 1);
        assert_eq!(summary.failed_requests, 1);
        assert!((summary.avg_response_time - 300.0).abs() < 1e-6);
        assert_eq!(summary.total_bytes_sent, 2048);
        assert_eq!(summary.total_bytes_sent_formatted, "2.0 KB");
        assert!((summary.uptime_seconds - 10.0).abs() < 1e-6);
        assert_eq!(report.performance.response_time_ms.p50, 400.0);
        assert_eq!(report.recent_requests.len(), 3);

        let json = serde_json::to_value(&report).unwrap();
        let top = json["top_paths"].as_object().unwrap();
        let first = top.keys().next().unwrap();
        assert_eq!(first, "/v1/messages");
        assert_eq!(top["/v1/messages"]["errors"], 1);
        assert_eq!(top["/v1/messages"]["success_rate"], 0.5);
    }

    #[test]
    fn stats_limit_keeps_newest() {
        let store = store();
        let now = 50_000.0;
        for i in 0..5 {
            store.record_start_at(&format!("/{}", i), "GET", 0, now - 10.0 + i as f64);
        }

        let query = StatsQuery {
            limit: 2,
            ..StatsQuery::default()
        };
        let report = get_stats_at(&store, &query, now);
        let paths: Vec<_> = report.recent_requests.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/3", "/4"]);

        let query = StatsQuery {
            limit: 0,
            ..StatsQuery::default()
        };
        assert_eq!(get_stats_at(&store, &query, now).recent_requests.len(), 5);
    }

    #[test]
    fn errors_report_filters_and_paginates() {
        let store = store();
        let now = store.counters().start_time + 100.0;
        for i in 0..4 {
            let path = if i % 2 == 0 { "/v1/Messages" } else { "/v1/models" };
            let id = store.record_start_at(path, "POST", 0, now - 50.0 + i as f64);
            store.record_error(
                &id,
                path,
                "POST",
                format!("HTTP 50{}", i),
                0.01234,
                Some("boom".into()),
                Some(500),
            );
        }
        store.record_start_at("/v1/messages", "POST", 0, now - 1.0);

        let query = ErrorsQuery {
            limit: 1,
            offset: 0,
            path_filter: Some("messages".into()),
            ..ErrorsQuery::default()
        };
        let report = get_errors_at(&store, &query, now);
        assert_eq!(report.pagination.total, 2);
        assert!(report.pagination.has_more);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, "/v1/Messages");
        assert_eq!(report.errors[0].response_time, 12.34);
        assert_eq!(report.errors[0].response_content.as_deref(), Some("boom"));
        assert_eq!(report.errors[0].formatted_time.len(), 19);
        assert_eq!(report.statistics.total_requests, 5);
        assert!((report.statistics.error_rate - 0.4).abs() < 1e-9);

        let report = get_errors_at(&store, &ErrorsQuery::default(), now);
        assert_eq!(report.pagination.total, 4);
        assert!(!report.pagination.has_more);
        let by_path = &report.statistics.errors_by_path.0;
        assert_eq!(by_path.len(), 2);
        assert_eq!(by_path[0], ("/v1/Messages".to_string(), 2));
    }
}
