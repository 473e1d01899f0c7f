//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::Path,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use transparent_proxy::{HttpServer, ProxyConfig, Shutdown, TelemetryStore};

/// Server-sent event chunks emitted by the mock upstream's `/stream` route.
pub const SSE_CHUNKS: [&str; 3] = [
    "data: {\"delta\":\"Hel\"}\n\n",
    "data: {\"delta\":\"lo\"}\n\n",
    "data: [DONE]\n\n",
];

/// Start a mock upstream API on an ephemeral port.
///
/// - `/status/{code}` answers with that status and a small JSON error body
/// - `/stream` emits [`SSE_CHUNKS`] with short pauses
/// - `/stall` emits the first SSE chunk and then never sends another byte
/// - `/no-content` answers 204
/// - anything else echoes the request back as JSON
pub async fn start_mock_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/status/{code}", get(status).post(status))
        .route("/stream", get(sse).post(sse))
        .route("/stall", get(stall).post(stall))
        .route("/no-content", get(no_content).delete(no_content))
        .fallback(echo);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let mut header_map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &headers {
        let value = value.to_str().unwrap_or_default().to_string();
        header_map
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    Json(json!({
        "method": method.as_str(),
        "uri": uri.to_string(),
        "headers": header_map,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn status(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap();
    (status, Json(json!({ "error": format!("status {}", code) }))).into_response()
}

async fn sse() -> Response {
    let chunks = stream::iter(SSE_CHUNKS).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, Infallible>(Bytes::from_static(chunk.as_bytes()))
    });

    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(chunks))
        .unwrap()
}

async fn stall() -> Response {
    let chunks = stream::iter([Ok::<_, Infallible>(Bytes::from_static(SSE_CHUNKS[0].as_bytes()))])
        .chain(stream::pending());

    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(chunks))
        .unwrap()
}

async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Configuration pointing at `upstream` with the dashboard enabled.
pub fn proxy_config(upstream: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.base_url = format!("http://{}", upstream);
    config.upstream.timeout_secs = 5;
    config.upstream.connect_timeout_secs = 2;
    config
}

/// A proxy running in the background for one test.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub telemetry: Arc<TelemetryStore>,
    pub config_updates: mpsc::UnboundedSender<ProxyConfig>,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn spawn_proxy(config: ProxyConfig) -> TestProxy {
    let server = HttpServer::new(config).unwrap();
    let telemetry = server.telemetry();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, server_shutdown).await;
    });

    TestProxy {
        addr,
        telemetry,
        config_updates,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
