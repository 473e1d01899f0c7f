//! Dashboard admin API and static assets.
//!
//! # Responsibilities
//! - Expose telemetry reports and the live configuration under `/api/admin`
//! - Serve the dashboard single-page app under `/admin`
//! - Refuse every admin route with 403 when the dashboard is disabled
//!
//! # Design Decisions
//! - Unauthenticated; deploy behind a trusted network boundary
//! - Unknown `/api/admin/*` paths are forwarded upstream like any other
//!   request, but only while the dashboard is enabled

pub mod assets;
pub mod gate;
pub mod handlers;

use axum::{
    middleware,
    routing::{any, get},
    Router,
};

use crate::http::server::{proxy_handler, AppState};

use self::assets::{admin_asset, admin_index};
use self::gate::require_dashboard;
use self::handlers::*;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/admin/health", get(health))
        .route("/api/admin/config", get(get_config).put(update_config))
        .route("/api/admin/stats", get(get_stats))
        .route("/api/admin/errors", get(get_errors))
        .route("/api/admin/{*rest}", any(proxy_handler))
        .route("/admin", get(admin_index))
        .route("/admin/", get(admin_index))
        .route("/admin/{*path}", get(admin_asset))
        .layer(middleware::from_fn_with_state(state, require_dashboard))
}
