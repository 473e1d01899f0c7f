//! Pooled HTTP client for the single upstream.
//!
//! # Responsibilities
//! - Join the base URL with the inbound path and query
//! - Send the forwarded request, bounding the wait for response headers
//!   and for every body read
//! - Classify transport failures
//! - Expose the response body as a single-pass byte stream

use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::redirect::Policy;
use reqwest::Client;

use crate::config::validation::parse_base_url;
use crate::config::UpstreamConfig;
use crate::transform::filter_response_headers;

/// Failure talking to the upstream.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid upstream URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("upstream did not respond within {0}s")]
    Timeout(u64),
    #[error("upstream body stalled for {0}s")]
    ReadTimeout(u64),
    #[error("failed to connect to upstream: {0}")]
    Connect(#[source] reqwest::Error),
    #[error("{0}")]
    Transport(#[source] reqwest::Error),
    #[error("{0}")]
    Body(#[source] reqwest::Error),
}

impl UpstreamError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::InvalidUrl { .. } => "invalid_url",
            UpstreamError::Timeout(_) => "timeout",
            UpstreamError::ReadTimeout(_) => "read_timeout",
            UpstreamError::Connect(_) => "connect",
            UpstreamError::Transport(_) => "transport",
            UpstreamError::Body(_) => "body",
        }
    }
}

/// Response body chunks, read lazily from the upstream connection.
pub type UpstreamBody = BoxStream<'static, Result<Bytes, UpstreamError>>;

/// A request ready to leave the proxy.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Inbound path, query string included when present.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Upstream response head plus its unread body.
pub struct UpstreamResponse {
    pub status: StatusCode,
    /// Hop-by-hop headers already removed.
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    authority: String,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let parsed = parse_base_url(&config.base_url).map_err(|e| UpstreamError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let host = parsed.host_str().unwrap_or_default();
        let authority = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let client = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .tcp_nodelay(true)
            .build()
            .map_err(UpstreamError::Transport)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            authority,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// `host[:port]` of the upstream, used as `Host` when not preserving it.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Destination URL for an inbound `path?query`.
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    /// Send `request` and return once the response head has arrived.
    pub async fn forward(&self, request: ForwardRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.url_for(&request.path_and_query);

        tracing::debug!(
            method = %request.method,
            url = %url,
            body_size = request.body.len(),
            "Forwarding request to upstream"
        );

        let send = self
            .client
            .request(request.method, &url)
            .headers(request.headers)
            .body(request.body)
            .send();

        let response = match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.classify(e)),
            Err(_) => return Err(UpstreamError::Timeout(self.timeout.as_secs())),
        };

        let status = response.status();
        let headers = filter_response_headers(response.headers());
        let body = bounded_reads(response.bytes_stream(), self.timeout);

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }

    fn classify(&self, error: reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout(self.timeout.as_secs())
        } else if error.is_connect() {
            UpstreamError::Connect(error)
        } else {
            UpstreamError::Transport(error)
        }
    }
}

/// Body stream whose every read must finish within `timeout`.
///
/// A stall ends the stream with `ReadTimeout`; a transport error ends it
/// with `Body`.
fn bounded_reads<S>(body: S, timeout: Duration) -> UpstreamBody
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let secs = timeout.as_secs();
    stream::unfold(Some(body.boxed()), move |body| async move {
        let mut body = body?;
        match tokio::time::timeout(timeout, body.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
            Ok(Some(Err(e))) => Some((Err(UpstreamError::Body(e)), None)),
            Ok(None) => None,
            Err(_) => Some((Err(UpstreamError::ReadTimeout(secs)), None)),
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> UpstreamClient {
        UpstreamClient::new(&UpstreamConfig {
            base_url: base_url.to_string(),
            ..UpstreamConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn joins_base_path_and_query() {
        let c = client("https://api.example.com/");
        assert_eq!(c.url_for("/v1/messages?beta=true"), "https://api.example.com/v1/messages?beta=true");
        assert_eq!(c.authority(), "api.example.com");
    }

    #[test]
    fn base_path_prefix_kept() {
        let c = client("http://127.0.0.1:9000/prefix");
        assert_eq!(c.url_for("/v1/models"), "http://127.0.0.1:9000/prefix/v1/models");
        assert_eq!(c.authority(), "127.0.0.1:9000");
    }

    #[test]
    fn rejects_bad_base_url() {
        let err = UpstreamClient::new(&UpstreamConfig {
            base_url: "ftp://example.com".into(),
            ..UpstreamConfig::default()
        })
        .err()
        .unwrap();
        assert_eq!(err.kind(), "invalid_url");
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let c = client(&format!("http://{}", addr));
        let err = c
            .forward(ForwardRequest {
                method: Method::GET,
                path_and_query: "/".into(),
                headers: HeaderMap::new(),
                body: Bytes::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), "connect" | "transport"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_body_ends_with_read_timeout() {
        let chunks = stream::iter([Ok::<_, reqwest::Error>(Bytes::from_static(b"data: a\n\n"))])
            .chain(stream::pending());
        let mut body = bounded_reads(chunks, Duration::from_secs(1));

        assert_eq!(&body.next().await.unwrap().unwrap()[..], b"data: a\n\n");
        let err = body.next().await.unwrap().unwrap_err();
        assert!(matches!(err, UpstreamError::ReadTimeout(1)));
        assert!(body.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_body_ends_cleanly() {
        let chunks = stream::iter([
            Ok::<_, reqwest::Error>(Bytes::from_static(b"a")),
            Ok(Bytes::from_static(b"b")),
        ]);
        let collected: Vec<_> = bounded_reads(chunks, Duration::from_secs(1))
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
    }
}
