//! Per-minute time-window sampler.
//!
//! Appends one bucket per series to the store on a fixed interval so the
//! dashboard can chart requests, errors and bytes over time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::config::TelemetryConfig;
use crate::telemetry::store::TelemetryStore;

pub struct TimeWindowSampler {
    store: Arc<TelemetryStore>,
    interval: Duration,
}

impl TimeWindowSampler {
    pub fn new(store: Arc<TelemetryStore>, config: &TelemetryConfig) -> Self {
        Self {
            store,
            interval: Duration::from_secs(config.window_interval_secs),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!(
            interval_secs = self.interval.as_secs(),
            "Time window sampler starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.store.update_time_window();
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Time window sampler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
