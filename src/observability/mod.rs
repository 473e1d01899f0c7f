//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy pipeline, telemetry store, transform:
//!     → logging.rs (tracing subscriber, EnvFilter)
//!     → metrics.rs (counters and histograms via the metrics facade)
//!
//! Consumers:
//!     → stdout log lines
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Metric calls are no-ops until a recorder is installed
//! - The dashboard telemetry store is separate from these metrics and is
//!   always on

pub mod logging;
pub mod metrics;
