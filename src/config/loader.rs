//! Configuration loading from disk and environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Custom headers file error: {0}")]
    Headers(#[from] serde_json::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the startup configuration: optional file, then headers file, then
/// process environment, then validation.
pub fn load_startup_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    if let Some(headers_path) = config.custom_headers_file.clone() {
        if headers_path.exists() {
            let from_file = load_custom_headers(&headers_path)?;
            tracing::info!(
                path = %headers_path.display(),
                count = from_file.len(),
                "Loaded custom headers"
            );
            config.custom_headers.extend(from_file);
        }
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply deployment environment variables on top of a config.
///
/// `lookup` is the variable source; the binary passes the process environment.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("API_BASE_URL") {
        config.upstream.base_url = url;
    }
    if let Some(port) = lookup("PORT") {
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port.trim());
    }
    if let Some(flag) = lookup("PRESERVE_HOST").and_then(|v| parse_flag(&v)) {
        config.upstream.preserve_host = flag;
    }
    if let Some(text) = lookup("SYSTEM_PROMPT_REPLACEMENT") {
        config.transform.system_prompt_replacement = if text.is_empty() { None } else { Some(text) };
    }
    if let Some(flag) = lookup("ENABLE_DASHBOARD").and_then(|v| parse_flag(&v)) {
        config.dashboard.enabled = flag;
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.observability.log_level = level;
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read header overrides from a JSON object file.
pub fn load_custom_headers(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Persist header overrides as a pretty-printed JSON object.
pub fn save_custom_headers(
    path: &Path,
    headers: &BTreeMap<String, String>,
) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(headers)?;
    fs::write(path, json)?;
    Ok(())
}
