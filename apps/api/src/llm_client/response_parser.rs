//! Shared JSON extraction for loosely-structured model replies.
//!
//! One policy for every consumer: prefer a fenced code block, otherwise take
//! the span from the first `{` to the last `}`. Either a fully valid object is
//! returned or the call fails; there is no partial recovery.

use serde::de::DeserializeOwned;
use thiserror::Error;

/// The model reply did not contain a parseable JSON object.
///
/// `raw` is kept for diagnostics logging and is not part of the message.
#[derive(Debug, Clone, Error)]
#[error("AI returned an invalid format during {context}: {reason}")]
pub struct MalformedModelOutput {
    pub context: String,
    pub raw: String,
    pub reason: String,
}

impl MalformedModelOutput {
    pub fn new(context: &str, raw: &str, reason: impl Into<String>) -> Self {
        Self {
            context: context.to_string(),
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

/// Locates and parses one JSON object from `raw`.
pub fn extract_json<T: DeserializeOwned>(raw: &str, context: &str) -> Result<T, MalformedModelOutput> {
    let candidate = locate_json(raw)
        .ok_or_else(|| MalformedModelOutput::new(context, raw, "no JSON object found"))?;

    serde_json::from_str(candidate)
        .map_err(|e| MalformedModelOutput::new(context, raw, format!("invalid JSON: {e}")))
}

/// Fenced block content if a fence holds an object, else the outermost brace span.
fn locate_json(raw: &str) -> Option<&str> {
    if let Some(block) = fenced_block(raw) {
        return Some(block);
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// First ```json (or untagged) fenced block whose body starts with `{`.
fn fenced_block(raw: &str) -> Option<&str> {
    const FENCE: &str = "```";
    let mut search = raw;

    loop {
        let open = search.find(FENCE)?;
        let after_open = &search[open + FENCE.len()..];
        let line_end = after_open.find('\n')?;
        let tag = after_open[..line_end].trim();
        let body_and_rest = &after_open[line_end + 1..];
        let close = body_and_rest.find(FENCE)?;
        let body = body_and_rest[..close].trim();

        if (tag.is_empty() || tag.eq_ignore_ascii_case("json")) && body.starts_with('{') {
            return Some(body);
        }
        search = &body_and_rest[close + FENCE.len()..];
    }
}
