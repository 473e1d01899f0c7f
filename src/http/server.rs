//! HTTP server setup and the proxy handler.
//!
//! # Responsibilities
//! - Create the Axum router (admin API, dashboard assets, catch-all proxy)
//! - Wire up middleware (tracing, request ID, body limit)
//! - Own the telemetry store and start its background tasks
//! - Apply hot-reloaded custom header overrides
//! - Forward every non-admin request to the upstream and relay the response

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::config::validation::ValidationError;
use crate::config::ProxyConfig;
use crate::http::request::{build_forward_request, ForwardSettings};
use crate::http::response::{relay, upstream_failure, RelayContext};
use crate::observability::metrics;
use crate::telemetry::{StaleRequestReaper, TelemetryStore, TimeWindowSampler};
use crate::transform::HeaderOverrides;
use crate::upstream::{UpstreamClient, UpstreamError};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Failure building the server from a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("invalid custom headers: {0:?}")]
    Headers(Vec<ValidationError>),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Startup configuration. Only custom headers change at runtime.
    pub config: Arc<ProxyConfig>,
    pub telemetry: Arc<TelemetryStore>,
    pub upstream: UpstreamClient,
    pub forward: Arc<ForwardSettings>,
    pub overrides: Arc<ArcSwap<HeaderOverrides>>,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        let overrides = HeaderOverrides::from_map(config.custom_headers.clone())
            .map_err(ServerError::Headers)?;
        let telemetry = Arc::new(TelemetryStore::new(&config.telemetry));

        let forward = ForwardSettings {
            preserve_host: config.upstream.preserve_host,
            upstream_authority: upstream.authority().to_string(),
            system_prompt_replacement: config.transform.system_prompt_replacement.clone(),
        };

        let state = AppState {
            config: Arc::new(config),
            telemetry,
            upstream,
            forward: Arc::new(forward),
            overrides: Arc::new(ArcSwap::from_pointee(overrides)),
        };

        let router = Self::build_router(state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let x_request_id = HeaderName::from_static(X_REQUEST_ID);
        let max_body_size = state.config.listener.max_body_size;

        Router::new()
            .merge(admin::router(state.clone()))
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(max_body_size))
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
    }

    /// Shared telemetry store.
    pub fn telemetry(&self) -> Arc<TelemetryStore> {
        self.state.telemetry.clone()
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Starts the stale request reaper and the time window sampler, and
    /// applies custom header changes arriving on `config_updates`.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.state.upstream.base_url(),
            dashboard = self.state.config.dashboard.enabled,
            "HTTP server starting"
        );

        let telemetry_config = &self.state.config.telemetry;
        let reaper = StaleRequestReaper::new(self.state.telemetry.clone(), telemetry_config);
        tokio::spawn(reaper.run(shutdown.resubscribe()));

        let sampler = TimeWindowSampler::new(self.state.telemetry.clone(), telemetry_config);
        tokio::spawn(sampler.run(shutdown.resubscribe()));

        tokio::spawn(apply_config_updates(
            config_updates,
            self.state.overrides.clone(),
            shutdown.resubscribe(),
        ));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal, draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Swap live header overrides whenever a reloaded configuration arrives.
async fn apply_config_updates(
    mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
    overrides: Arc<ArcSwap<HeaderOverrides>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(new_config) = update else { break };
                match HeaderOverrides::from_map(new_config.custom_headers) {
                    Ok(headers) => {
                        tracing::info!(count = headers.as_map().len(), "Custom headers reloaded");
                        overrides.store(Arc::new(headers));
                    }
                    Err(errors) => {
                        tracing::error!(?errors, "Reloaded custom headers are invalid, keeping current set");
                    }
                }
                tracing::info!("Other configuration changes take effect after a restart");
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Catch-all proxy handler.
pub(crate) async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let started = Instant::now();
    let correlation_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();
    let method = parts.method.to_string();

    let body = match axum::body::to_bytes(body, state.config.listener.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(correlation_id = %correlation_id, path = %path, error = %e, "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, format!("Failed to read request body: {}", e))
                .into_response();
        }
    };

    let forward = {
        let overrides = state.overrides.load();
        build_forward_request(&parts, body, client.ip(), &state.forward, &overrides)
    };
    let request_id = state
        .telemetry
        .record_start(&path, &method, forward.body.len() as u64);

    tracing::debug!(
        correlation_id = %correlation_id,
        request_id = %request_id,
        method = %method,
        path = %path,
        "Proxying request"
    );

    match state.upstream.forward(forward).await {
        Ok(upstream) => {
            let status = upstream.status.as_u16();
            metrics::record_request(&method, status, started.elapsed().as_secs_f64());

            relay(
                upstream,
                RelayContext {
                    telemetry: state.telemetry.clone(),
                    request_id,
                    path,
                    method,
                    started,
                    max_response_content: state.config.telemetry.max_response_content,
                },
            )
        }
        Err(e) => {
            let elapsed = started.elapsed().as_secs_f64();
            tracing::error!(
                correlation_id = %correlation_id,
                request_id = %request_id,
                path = %path,
                error = %e,
                "Upstream error"
            );
            metrics::record_upstream_failure(e.kind());
            metrics::record_request(&method, 502, elapsed);

            state.telemetry.record_error(
                &request_id,
                &path,
                &method,
                e.to_string(),
                elapsed,
                None,
                Some(502),
            );
            upstream_failure(&e)
        }
    }
}
