//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, body limit, admin vs proxy)
//!     → request.rs (path?query, forwarded headers, body transform)
//!     → upstream client
//!     → response.rs (streamed relay, telemetry finalization, 502 mapping)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use server::{AppState, HttpServer, ServerError, X_REQUEST_ID};
