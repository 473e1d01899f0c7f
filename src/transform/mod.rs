//! Request/response transformation subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → headers.rs (drop hop-by-hop, Host, Content-Length; overrides; X-Forwarded-For)
//!     → body.rs (rewrite system[0].text when configured)
//!     → upstream dispatcher
//!
//! Upstream response
//!     → headers.rs (drop hop-by-hop)
//!     → relayed to client
//! ```
//!
//! # Design Decisions
//! - Pure functions, no shared state
//! - Fail open: a transform problem never blocks or corrupts a request

pub mod body;
pub mod headers;

pub use body::{process_request_body, rewrite_system_prompt, RewriteSkipped};
pub use headers::{
    append_forwarded_for, filter_request_headers, filter_response_headers, HeaderOverrides,
};
