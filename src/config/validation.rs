//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate the upstream base URL
//! - Validate value ranges (timeouts > 0, capacities > 0, bind address)
//! - Validate custom header names and values
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}")]
    BindAddress(String),
    #[error("invalid upstream base_url {url:?}: {reason}")]
    BaseUrl { url: String, reason: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("invalid header name {0:?}")]
    HeaderName(String),
    #[error("invalid value for header {0:?}")]
    HeaderValue(String),
    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),
}

/// Validate a full configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::Zero("listener.max_body_size"));
    }

    if let Err(e) = parse_base_url(&config.upstream.base_url) {
        errors.push(e);
    }

    let upstream = &config.upstream;
    let telemetry = &config.telemetry;
    let positive = [
        ("upstream.timeout_secs", upstream.timeout_secs as usize),
        ("upstream.connect_timeout_secs", upstream.connect_timeout_secs as usize),
        ("telemetry.recent_capacity", telemetry.recent_capacity),
        ("telemetry.error_capacity", telemetry.error_capacity),
        ("telemetry.series_capacity", telemetry.series_capacity),
        ("telemetry.stale_after_secs", telemetry.stale_after_secs as usize),
        ("telemetry.reaper_interval_secs", telemetry.reaper_interval_secs as usize),
        ("telemetry.window_interval_secs", telemetry.window_interval_secs as usize),
    ];
    for (name, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if let Err(header_errors) = validate_headers(&config.custom_headers) {
        errors.extend(header_errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check that every override is a legal HTTP header name and value.
pub fn validate_headers(headers: &BTreeMap<String, String>) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    for (name, value) in headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::HeaderName(name.clone()));
        } else if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::HeaderValue(name.clone()));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse an upstream base URL, accepting only absolute http(s) URLs with a host.
pub fn parse_base_url(raw: &str) -> Result<Url, ValidationError> {
    let invalid = |reason: &str| ValidationError::BaseUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    if url.query().is_some() {
        return Err(invalid("query strings are not allowed"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-addr".into();
        config.upstream.base_url = "ftp://example.com".into();
        config.telemetry.recent_capacity = 0;
        config.custom_headers.insert("bad header".into(), "x".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::Zero("telemetry.recent_capacity")));
        assert!(errors.contains(&ValidationError::HeaderName("bad header".into())));
    }

    #[test]
    fn base_url_rules() {
        assert!(parse_base_url("https://api.example.com").is_ok());
        assert!(parse_base_url("http://127.0.0.1:3000/v1").is_ok());
        assert!(parse_base_url("example.com").is_err());
        assert!(parse_base_url("https://api.example.com/?x=1").is_err());
    }

    #[test]
    fn header_value_with_newline_rejected() {
        let mut headers = BTreeMap::new();
        headers.insert("x-test".to_string(), "a\nb".to_string());
        assert_eq!(
            validate_headers(&headers).unwrap_err(),
            vec![ValidationError::HeaderValue("x-test".into())]
        );
    }
}
