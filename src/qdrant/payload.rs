//! Helpers for constructing Qdrant payloads and point identifiers.

use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

/// Payload stored alongside each symptom vector.
pub(crate) fn build_symptom_payload(symptom: &str, severity: &str, timestamp: &str) -> Value {
    json!({
        "symptom": symptom,
        "severity": severity,
        "vectorized_at": timestamp,
    })
}

/// Payload stored for each disease document.
pub(crate) fn build_disease_payload(
    name: &str,
    description: &str,
    symptom_ids: &[String],
    symptom_names: &[String],
    timestamp: &str,
) -> Value {
    json!({
        "name": name,
        "description": description,
        "symptom_ids": symptom_ids,
        "symptom_names": symptom_names,
        "created_at": timestamp,
    })
}

/// Read a trimmed, non-empty string field from a payload.
pub(crate) fn payload_str(payload: &Map<String, Value>, key: &str) -> Option<String> {
    match payload.get(key) {
        Some(Value::String(value)) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    }
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct a fresh identifier for a new point.
pub(crate) fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}

/// Encode an identifier the way Qdrant expects it: integers as numbers, UUIDs as strings.
pub(crate) fn point_id_value(id: &str) -> Option<Value> {
    let trimmed = id.trim();
    if let Ok(number) = trimmed.parse::<u64>() {
        return Some(Value::from(number));
    }
    Uuid::parse_str(trimmed)
        .ok()
        .map(|uuid| Value::String(uuid.to_string()))
}

/// Render a Qdrant point id as a plain string.
pub(crate) fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Object(map) => map
            .get("uuid")
            .map(|value| match value {
                Value::String(uuid) => uuid.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| Value::Object(map).to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
