//! Request body rewriting.
//!
//! Replaces `system[0].text` in JSON request bodies. Every failure is
//! fail-open: the original bytes are forwarded untouched.

use bytes::Bytes;
use serde_json::Value;

use crate::observability::metrics;

/// Why a body was forwarded unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RewriteSkipped {
    #[error("body is not valid JSON")]
    NotJson,
    #[error("no 'system' field")]
    MissingSystem,
    #[error("'system' is not an array")]
    SystemNotArray,
    #[error("'system' array is empty")]
    SystemEmpty,
    #[error("first system block has no 'text' field")]
    MissingText,
    #[error("failed to serialize rewritten body")]
    Serialize,
}

impl RewriteSkipped {
    fn label(self) -> &'static str {
        match self {
            RewriteSkipped::NotJson => "not_json",
            RewriteSkipped::MissingSystem => "missing_system",
            RewriteSkipped::SystemNotArray => "system_not_array",
            RewriteSkipped::SystemEmpty => "system_empty",
            RewriteSkipped::MissingText => "missing_text",
            RewriteSkipped::Serialize => "serialize",
        }
    }
}

/// Replace the text of the first system block, re-serializing compactly.
pub fn rewrite_system_prompt(body: &[u8], replacement: &str) -> Result<Vec<u8>, RewriteSkipped> {
    let mut data: Value = serde_json::from_slice(body).map_err(|_| RewriteSkipped::NotJson)?;

    let system = data
        .get_mut("system")
        .ok_or(RewriteSkipped::MissingSystem)?
        .as_array_mut()
        .ok_or(RewriteSkipped::SystemNotArray)?;
    let first = system.first_mut().ok_or(RewriteSkipped::SystemEmpty)?;
    let text = first
        .as_object_mut()
        .and_then(|block| block.get_mut("text"))
        .ok_or(RewriteSkipped::MissingText)?;

    *text = Value::String(replacement.to_string());

    serde_json::to_vec(&data).map_err(|_| RewriteSkipped::Serialize)
}

/// Apply the configured rewrite, returning the original bytes on any failure.
pub fn process_request_body(body: Bytes, replacement: Option<&str>) -> Bytes {
    let Some(replacement) = replacement else {
        return body;
    };

    match rewrite_system_prompt(&body, replacement) {
        Ok(rewritten) => {
            tracing::debug!(
                original_size = body.len(),
                new_size = rewritten.len(),
                "Rewrote system prompt"
            );
            metrics::record_body_rewrite("rewritten");
            Bytes::from(rewritten)
        }
        Err(reason) => {
            tracing::debug!(reason = %reason, "Keeping original request body");
            metrics::record_body_rewrite(reason.label());
            body
        }
    }
}
