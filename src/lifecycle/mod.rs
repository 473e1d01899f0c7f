//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → HTTP server stops accepting and drains
//!               → stale request reaper exits
//!               → time window sampler exits
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task holds its own receiver
//! - In-flight telemetry is dropped on exit, nothing is flushed

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
