//! Upstream dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Transformed request (method, path?query, headers, body)
//!     → client.rs (URL join, pooled reqwest client, time-to-headers bound)
//!     → UpstreamResponse { status, filtered headers, lazy body stream }
//!     → relayed chunk by chunk by the HTTP layer
//! ```
//!
//! # Design Decisions
//! - One client per process, built at startup
//! - Redirects are never followed; 3xx responses go back to the client
//! - No retries: a forwarded request may not be idempotent

pub mod client;

pub use client::{ForwardRequest, UpstreamBody, UpstreamClient, UpstreamError, UpstreamResponse};
