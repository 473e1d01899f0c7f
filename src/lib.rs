//! Transparent API reverse proxy with request telemetry and an admin dashboard.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod telemetry;
pub mod transform;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use telemetry::TelemetryStore;
