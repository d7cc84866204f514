//! Recovery of structured symptom lists from wrapped LLM output.

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use thiserror::Error;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n?(.*?)\s*```$").expect("fence pattern compiles")
});

/// Failures recovering the extraction payload.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Model returned nothing usable.
    #[error("Extraction output was empty")]
    Empty,
    /// Unwrapped text was not the expected JSON document.
    #[error("Failed to parse extraction output: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// One symptom as reported by the extraction model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtractedSymptom {
    /// Root symptom word, e.g. `fever`.
    pub core_symptom: String,
    /// Severity between 1 and 3.
    #[serde(default, deserialize_with = "lenient_string")]
    pub severity: Option<String>,
    /// Priority between 1 (high) and 3 (low).
    #[serde(default, deserialize_with = "lenient_string")]
    pub priority: Option<String>,
}

/// Top-level extraction document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtractedSymptoms {
    /// Symptoms in the order the model listed them.
    pub symptoms: Vec<ExtractedSymptom>,
}

impl ExtractedSymptoms {
    /// Non-empty, trimmed symptom labels in model order.
    pub fn labels(&self) -> Vec<String> {
        self.symptoms
            .iter()
            .map(|item| item.core_symptom.trim())
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Strip a surrounding Markdown code fence, if any.
pub fn strip_wrapping(raw: &str) -> &str {
    let trimmed = raw.trim();
    match FENCE.captures(trimmed).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Parse raw model output into structured symptoms.
pub fn parse_extraction(raw: &str) -> Result<ExtractedSymptoms, ParseError> {
    let body = strip_wrapping(raw);
    if body.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(serde_json::from_str(body)?)
}

// Models emit severities both as "2" and 2.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}
