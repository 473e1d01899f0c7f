//! Stale request reaper.
//!
//! # Responsibilities
//! - Periodically find pending records older than the stale threshold
//! - Finalize each one as a 504 timeout through the normal error path
//!
//! # Design Decisions
//! - Snapshot under the lock, finalize after releasing it
//! - A response finishing between snapshot and finalization wins; the
//!   timeout then becomes a skipped finalization
//! - Records evicted from the ring before a sweep are never timed out

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::config::TelemetryConfig;
use crate::observability::metrics;
use crate::telemetry::store::TelemetryStore;
use crate::telemetry::unix_now;

pub struct StaleRequestReaper {
    store: Arc<TelemetryStore>,
    interval: Duration,
    max_age: f64,
}

impl StaleRequestReaper {
    pub fn new(store: Arc<TelemetryStore>, config: &TelemetryConfig) -> Self {
        Self {
            store,
            interval: Duration::from_secs(config.reaper_interval_secs),
            max_age: config.stale_after_secs as f64,
        }
    }

    /// Sweep every interval until shutdown. The first sweep runs one
    /// interval after start.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            stale_after_secs = self.max_age,
            "Stale request reaper starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_at(unix_now());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Stale request reaper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Time out every pending record older than the threshold at `now`.
    ///
    /// Returns how many timeouts were applied.
    pub fn sweep_at(&self, now: f64) -> usize {
        let stale = self.store.stale_pending(now, self.max_age);
        if stale.is_empty() {
            return 0;
        }

        let mut reaped = 0;
        for request in stale {
            let message = format!("request timed out after {:.0}s", request.age);
            let outcome = self.store.record_error(
                &request.request_id,
                &request.path,
                &request.method,
                message,
                request.age,
                None,
                Some(504),
            );
            if outcome.is_applied() {
                reaped += 1;
                tracing::warn!(
                    request_id = %request.request_id,
                    path = %request.path,
                    method = %request.method,
                    age_secs = request.age,
                    "Request timed out"
                );
            }
        }

        metrics::record_stale_reaped(reaped);
        reaped
    }
}
