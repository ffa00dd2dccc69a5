//! Best-effort parsing of free-text model output.
//!
//! Models wrap the answer in chat-template residue, code fences and Python
//! literals; everything here is tolerant and callers degrade to "nothing
//! detected" on failure.

use crate::schema::normalize_name;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

const ASSISTANT_MARKER: &str = "ASSISTANT:";
const DESCRIPTION_PREAMBLE: &str = "The description should be";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("could not find a JSON-like object in the response")]
    NoJson,
    #[error("error decoding JSON response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("JSON response is not an object")]
    NotAnObject,
}

/// Text generated after the chat template's assistant marker.
pub fn strip_assistant_prefix(text: &str) -> &str {
    match text.rfind(ASSISTANT_MARKER) {
        Some(idx) => text[idx + ASSISTANT_MARKER.len()..].trim(),
        None => text.trim(),
    }
}

/// Span from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Single quotes, Python literals and markdown-escaped underscores.
pub fn repair_json(raw: &str) -> String {
    raw.replace('\'', "\"")
        .replace("True", "true")
        .replace("False", "false")
        .replace("None", "null")
        .replace("\\_", "_")
}

/// Parses `{"amenity": bool, ...}` into normalized names.
///
/// Values may be booleans, yes/no strings or numbers; a nested object
/// (`{"kitchen": {"oven": true}}`) is flattened one level.
pub fn parse_presence(response: &str) -> Result<BTreeMap<String, bool>, ParseError> {
    let body = strip_assistant_prefix(response);
    let raw = extract_json_object(body).ok_or(ParseError::NoJson)?;
    let value: Value = match serde_json::from_str(&raw.replace("\\_", "_")) {
        Ok(v) => v,
        Err(_) => serde_json::from_str(&repair_json(raw))?,
    };
    let Value::Object(map) = value else {
        return Err(ParseError::NotAnObject);
    };

    let mut out = BTreeMap::new();
    for (key, value) in map {
        match value {
            Value::Object(inner) => {
                for (k, v) in inner {
                    merge(&mut out, &k, &v);
                }
            }
            other => merge(&mut out, &key, &other),
        }
    }
    Ok(out)
}

fn merge(out: &mut BTreeMap<String, bool>, key: &str, value: &Value) {
    let name = normalize_name(key);
    if name.is_empty() {
        return;
    }
    let slot = out.entry(name).or_insert(false);
    *slot |= is_present(value);
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "y" | "present" | "1"
        ),
        _ => false,
    }
}

/// Drops template residue and the model's restated instructions.
pub fn clean_description(text: &str) -> String {
    let mut description = strip_assistant_prefix(text);
    if let Some(idx) = description.find(DESCRIPTION_PREAMBLE) {
        description = &description[idx + DESCRIPTION_PREAMBLE.len()..];
        if let Some(colon) = description.find(':') {
            description = &description[colon + 1..];
        }
    }
    description.trim().to_string()
}
