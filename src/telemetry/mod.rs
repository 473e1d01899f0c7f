//! Request telemetry subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy pipeline
//!     → store.rs record_start (pending record, counters, path aggregate)
//!     → store.rs record_success / record_error (first finalizer wins)
//!
//! Background tasks
//!     → reaper.rs  (pending > stale_after_secs → 504 timeout)
//!     → sampler.rs (one per-minute bucket per series)
//!
//! Admin API
//!     → query.rs (time-filtered views, percentiles, stats/errors reports)
//! ```
//!
//! # Design Decisions
//! - All state lives in one `TelemetryStore` shared by `Arc`
//! - Retained collections are bounded rings; eviction is the only removal
//! - Nothing here is persisted across restarts

pub mod buffer;
pub mod query;
pub mod reaper;
pub mod record;
pub mod sampler;
pub mod store;

use std::time::{SystemTime, UNIX_EPOCH};

pub use buffer::BoundedBuffer;
pub use query::{ErrorsQuery, ErrorsReport, StatsQuery, StatsReport};
pub use reaper::StaleRequestReaper;
pub use record::{
    ErrorEntry, GlobalCounters, Outcome, PathAggregate, RequestId, RequestRecord, RequestStatus,
    TimeBucket,
};
pub use sampler::TimeWindowSampler;
pub use store::{Finalization, StaleRequest, TelemetryStore};

/// Current wall-clock time in fractional unix seconds.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
