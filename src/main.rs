//! Transparent API Reverse Proxy
//!
//! Forwards every request to a single upstream API, relays responses
//! (including server-sent event streams) chunk by chunk, and records
//! per-request telemetry for the admin dashboard.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                 TRANSPARENT PROXY                │
//!                        │                                                  │
//!   Client Request       │  ┌─────────┐   ┌───────────┐   ┌──────────────┐  │
//!   ─────────────────────┼─▶│  http   │──▶│ transform │──▶│   upstream   │──┼──▶ Upstream
//!                        │  │ server  │   │ headers + │   │    client    │  │     API
//!                        │  └────┬────┘   │   body    │   └──────┬───────┘  │
//!                        │       │        └───────────┘          │          │
//!   Client Response      │  ┌────▼────┐                   ┌──────▼───────┐  │
//!   ◀────────────────────┼──│  admin  │   streamed relay  │   response   │◀─┼─── chunks
//!                        │  │  API    │◀─────────────────▶│    relay     │  │
//!                        │  └────┬────┘                   └──────┬───────┘  │
//!                        │       │        ┌───────────┐          │          │
//!                        │       └───────▶│ telemetry │◀─────────┘          │
//!                        │                │   store   │◀── reaper, sampler  │
//!                        │                └───────────┘                     │
//!                        │                                                  │
//!                        │  config (TOML + env + watcher) · observability   │
//!                        │  lifecycle (signals, graceful shutdown)          │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use transparent_proxy::config::loader::load_startup_config;
use transparent_proxy::config::watcher::ConfigWatcher;
use transparent_proxy::lifecycle::{wait_for_signal, Shutdown};
use transparent_proxy::observability::{logging, metrics};
use transparent_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "transparent-proxy")]
#[command(about = "Transparent API reverse proxy with a telemetry dashboard", long_about = None)]
struct Args {
    /// TOML configuration file. Watched for custom header changes.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_startup_config(args.config.as_deref())?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!("transparent-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        preserve_host = config.upstream.preserve_host,
        system_prompt_rewrite = config.transform.system_prompt_replacement.is_some(),
        custom_headers = config.custom_headers.len(),
        dashboard = config.dashboard.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), updates),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    (None, updates)
                }
            }
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        tracing::info!(signal, "Shutdown signal received");
        signal_shutdown.trigger();
    });

    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
