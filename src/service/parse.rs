//! Tolerant decoding of model replies.
//!
//! Models wrap their JSON in prose, markdown fences or both. The ladder
//! here: parse the whole reply, then the first fenced block, then the first
//! balanced object found by brace scanning. Callers choose between a typed
//! error and a typed default when every rung fails.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap()
    })
}

/// Locate and decode the first well-formed JSON object in `raw`
pub fn first_json_object(raw: &str) -> Option<serde_json::Value> {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    if let Some(captures) = fence_regex().captures(raw) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&captures[1]) {
            return Some(value);
        }
    }

    scan_balanced_object(raw)
        .and_then(|candidate| serde_json::from_str::<serde_json::Value>(candidate).ok())
}

/// Find the first `{ ... }` span with balanced braces, ignoring braces
/// inside string literals
fn scan_balanced_object(raw: &str) -> Option<&str> {
    let bytes = raw.as_bytes();
    let start = raw.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode the first JSON object in `raw` into `T`
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let value = first_json_object(raw)
        .ok_or_else(|| format!("no JSON object found in {} chars of output", raw.len()))?;
    serde_json::from_value(value).map_err(|e| e.to_string())
}

/// Decode the first JSON object in `raw` into `T`, falling back to the
/// type's default when nothing decodes. Used where an empty-but-valid
/// payload is the safe answer.
pub fn decode_or_default<T: DeserializeOwned + Default>(raw: &str) -> T {
    match decode(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                error = %e,
                preview = raw.chars().take(120).collect::<String>().as_str(),
                "Falling back to empty payload for undecodable model output"
            );
            T::default()
        }
    }
}
