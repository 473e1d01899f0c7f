//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// The single upstream all traffic is forwarded to.
    pub upstream: UpstreamConfig,

    /// Request body rewriting.
    pub transform: TransformConfig,

    /// Header overrides applied to every forwarded request.
    /// Replaces same-named headers from the client. Hot-swappable.
    pub custom_headers: BTreeMap<String, String>,

    /// Optional JSON file holding header overrides.
    /// Loaded at startup and rewritten when the admin API updates headers.
    pub custom_headers_file: Option<PathBuf>,

    /// Dashboard and admin API settings.
    pub dashboard: DashboardConfig,

    /// Telemetry buffer sizes and background task intervals.
    pub telemetry: TelemetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8088").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8088".to_string(),
            max_body_size: 32 * 1024 * 1024, // 32MB
        }
    }
}

impl ListenerConfig {
    /// Port component of the bind address, if it parses.
    pub fn port(&self) -> Option<u16> {
        self.bind_address
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
    }
}

/// Upstream target configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL requests are forwarded to (e.g., "https://api.example.com").
    pub base_url: String,

    /// Forward the client's Host header instead of the upstream authority.
    pub preserve_host: bool,

    /// Seconds to wait for the upstream response head, and for each body read after it.
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Idle pooled connections are closed after this many seconds.
    pub pool_idle_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://anyrouter.top".to_string(),
            preserve_host: false,
            timeout_secs: 60,
            connect_timeout_secs: 10,
            pool_idle_timeout_secs: 90,
        }
    }
}

/// Request body rewriting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TransformConfig {
    /// Replacement for `system[0].text` in JSON bodies. `None` disables rewriting.
    pub system_prompt_replacement: Option<String>,
}

/// Dashboard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Enable the admin API and static dashboard.
    pub enabled: bool,

    /// Directory holding the built dashboard assets.
    pub static_dir: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            static_dir: PathBuf::from("static"),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Number of recent request records retained.
    pub recent_capacity: usize,

    /// Number of error log entries retained.
    pub error_capacity: usize,

    /// Number of per-minute buckets retained per series (1440 = 24h).
    pub series_capacity: usize,

    /// Pending requests older than this are finalized as timeouts.
    pub stale_after_secs: u64,

    /// Interval between stale request sweeps.
    pub reaper_interval_secs: u64,

    /// Interval between time-series samples.
    pub window_interval_secs: u64,

    /// Maximum characters of captured error body kept per request.
    pub max_response_content: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 1000,
            error_capacity: 500,
            series_capacity: 1440,
            stale_after_secs: 300,
            reaper_interval_secs: 60,
            window_interval_secs: 60,
            max_response_content: 50 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
