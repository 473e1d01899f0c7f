//! Admin API handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::loader::save_custom_headers;
use crate::http::server::AppState;
use crate::telemetry::query::{self, ErrorsQuery, ErrorsReport, StatsQuery, StatsReport};
use crate::telemetry::unix_now;
use crate::transform::HeaderOverrides;

// ─── Errors ──────────────────────────────────────────────────────

#[derive(Debug)]
pub enum AdminError {
    Disabled,
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Disabled => (StatusCode::FORBIDDEN, "Dashboard is disabled".to_string()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "detail": message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

// ─── Health ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub dashboard_enabled: bool,
    pub timestamp: f64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        dashboard_enabled: state.config.dashboard.enabled,
        timestamp: unix_now(),
    })
}

// ─── Configuration ───────────────────────────────────────────────

/// Effective configuration as shown on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigView {
    pub target_base_url: String,
    pub preserve_host: bool,
    pub system_prompt_replacement: Option<String>,
    /// Block insertion is not supported; always `false`.
    pub system_prompt_block_insert_if_not_exist: bool,
    /// No debug mode exists; always `false`.
    pub debug_mode: bool,
    pub port: Option<u16>,
    pub custom_headers: BTreeMap<String, String>,
    pub dashboard_enabled: bool,
}

fn config_view(state: &AppState) -> ConfigView {
    let config = &state.config;
    ConfigView {
        target_base_url: config.upstream.base_url.clone(),
        preserve_host: config.upstream.preserve_host,
        system_prompt_replacement: config.transform.system_prompt_replacement.clone(),
        system_prompt_block_insert_if_not_exist: false,
        debug_mode: false,
        port: config.listener.port(),
        custom_headers: state.overrides.load().as_map().clone(),
        dashboard_enabled: config.dashboard.enabled,
    }
}

pub async fn get_config(State(state): State<AppState>) -> Json<ConfigView> {
    Json(config_view(&state))
}

#[derive(Debug, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub custom_headers: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ConfigUpdateResponse {
    pub success: bool,
    pub updated_fields: Vec<&'static str>,
    pub message: &'static str,
    pub current_config: ConfigView,
}

/// Replace the live custom headers. Other settings need a restart.
pub async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ConfigUpdateResponse>, AdminError> {
    let mut updated_fields = Vec::new();

    if let Some(raw) = update.custom_headers {
        let headers = header_map_from_json(raw)?;
        let overrides = HeaderOverrides::from_map(headers).map_err(|errors| {
            let detail = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            AdminError::BadRequest(detail)
        })?;

        if let Some(path) = &state.config.custom_headers_file {
            save_custom_headers(path, overrides.as_map()).map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "Failed to persist custom headers");
                AdminError::Internal(format!("Failed to save configuration: {}", e))
            })?;
            tracing::info!(path = %path.display(), "Saved custom headers");
        }

        tracing::info!(count = overrides.as_map().len(), "Custom headers updated via admin API");
        state.overrides.store(Arc::new(overrides));
        updated_fields.push("custom_headers");
    }

    Ok(Json(ConfigUpdateResponse {
        success: true,
        updated_fields,
        message: "Configuration updated. Settings other than custom headers take effect after a restart.",
        current_config: config_view(&state),
    }))
}

fn header_map_from_json(raw: Value) -> Result<BTreeMap<String, String>, AdminError> {
    let Value::Object(object) = raw else {
        return Err(AdminError::BadRequest(
            "custom_headers must be an object".to_string(),
        ));
    };

    object
        .into_iter()
        .map(|(name, value)| match value {
            Value::String(value) => Ok((name, value)),
            _ => Err(AdminError::BadRequest(format!(
                "value of header {:?} must be a string",
                name
            ))),
        })
        .collect()
}

// ─── Telemetry ───────────────────────────────────────────────────

pub async fn get_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsQuery>,
) -> Json<StatsReport> {
    Json(query::get_stats(&state.telemetry, &params))
}

pub async fn get_errors(
    State(state): State<AppState>,
    Query(params): Query<ErrorsQuery>,
) -> Json<ErrorsReport> {
    Json(query::get_errors(&state.telemetry, &params))
}
