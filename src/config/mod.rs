//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse, env overrides, custom headers file)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated)
//!     → split into immutable settings + hot-swappable header overrides
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps custom headers only
//! ```
//!
//! # Design Decisions
//! - Everything except custom headers is fixed for the process lifetime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{
    DashboardConfig, ListenerConfig, ObservabilityConfig, ProxyConfig, TelemetryConfig,
    TransformConfig, UpstreamConfig,
};
