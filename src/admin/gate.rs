//! Dashboard on/off gate.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::admin::handlers::AdminError;
use crate::http::server::AppState;

pub async fn require_dashboard(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.dashboard.enabled {
        return AdminError::Disabled.into_response();
    }
    next.run(request).await
}
