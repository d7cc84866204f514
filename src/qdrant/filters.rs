//! Filter builders for Qdrant scroll and query requests.

use serde_json::{Value, json};

/// Exact match on a keyword field.
pub fn match_value(key: &str, value: &str) -> Value {
    json!({
        "must": [
            { "key": key, "match": { "value": value } }
        ]
    })
}

/// Field equals any of `values`. Returns `None` when no usable values remain.
pub fn match_any(key: &str, values: &[String]) -> Option<Value> {
    let cleaned = cleaned(values);
    if cleaned.is_empty() {
        return None;
    }
    Some(json!({
        "must": [
            { "key": key, "match": { "any": cleaned } }
        ]
    }))
}

/// Array field contains every one of `values`. Returns `None` when no usable values remain.
pub fn contains_all(key: &str, values: &[String]) -> Option<Value> {
    let must: Vec<Value> = cleaned(values)
        .into_iter()
        .map(|value| json!({ "key": key, "match": { "value": value } }))
        .collect();
    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

fn cleaned(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let trimmed = value.trim();
        if !trimmed.is_empty() && !out.iter().any(|seen| seen == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}
