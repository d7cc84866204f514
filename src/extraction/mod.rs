//! Symptom extraction from free-text notes via a hosted chat model.
//!
//! The client returns the model's raw text; turning it into structured data is the job of
//! [`parser`]. No client exists for the local provider, in which case the notes pipeline reports
//! a configuration error instead of calling out.

pub mod parser;
pub mod prompt;

use crate::config::Config;
use crate::provider::{ApiTarget, ProviderError, http_client};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

pub use parser::{ExtractedSymptom, ExtractedSymptoms, ParseError, parse_extraction};

/// Errors surfaced while calling the extraction model.
#[derive(Debug, Error)]
pub enum ExtractionClientError {
    /// Provider was unreachable or rejected the request outright.
    #[error("Extraction provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to extract symptoms: {0}")]
    GenerationFailed(String),
    /// Provider response could not be decoded.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by extraction backends.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Ask the model for the symptom list contained in `notes`; returns raw model text.
    async fn extract(&self, notes: &str) -> Result<String, ExtractionClientError>;
}

/// Generation settings for chat requests.
#[derive(Debug, Clone, Copy)]
pub struct ChatSettings {
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token ceiling.
    pub max_tokens: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 1024,
        }
    }
}

/// Chat-completions client for OpenAI-compatible and Azure endpoints.
pub struct ChatExtractionClient {
    http: Client,
    target: ApiTarget,
    settings: ChatSettings,
}

impl ChatExtractionClient {
    /// Build a client against an explicit target.
    pub fn new(http: Client, target: ApiTarget, settings: ChatSettings) -> Self {
        Self {
            http,
            target,
            settings,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ExtractionClient for ChatExtractionClient {
    async fn extract(&self, notes: &str) -> Result<String, ExtractionClientError> {
        let mut payload = json!({
            "messages": [
                { "role": "system", "content": prompt::SYSTEM_PROMPT },
                { "role": "user", "content": prompt::render_user_prompt(notes) }
            ],
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
        });
        if self.target.model_in_body()
            && let Some(map) = payload.as_object_mut()
        {
            map.insert("model".into(), Value::String(self.target.model().to_string()));
        }

        tracing::debug!(model = self.target.model(), "Requesting symptom extraction");

        let response = self
            .target
            .post(&self.http, "chat/completions")
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                ExtractionClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.target.endpoint("chat/completions")
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ExtractionClientError::ProviderUnavailable(format!(
                "model endpoint {} returned 404",
                self.target.endpoint("chat/completions")
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionClientError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            ExtractionClientError::InvalidResponse(format!("failed to decode response: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ExtractionClientError::InvalidResponse("response had no content".into()))
    }
}

/// Build an extraction client based on configuration.
///
/// Returns `Ok(None)` when the provider is local or no chat model is configured.
pub fn get_extraction_client(
    config: &Config,
) -> Result<Option<Arc<dyn ExtractionClient>>, ProviderError> {
    let Some(model) = config.chat_model.as_deref() else {
        tracing::warn!("CHAT_MODEL not set; notes conversion disabled");
        return Ok(None);
    };
    let Some(target) = ApiTarget::from_config(config, model)? else {
        tracing::warn!("Local provider has no chat model; notes conversion disabled");
        return Ok(None);
    };
    let http = http_client("symptom-atlas/extraction", config.request_timeout())?;
    let settings = ChatSettings {
        temperature: config.chat_temperature,
        max_tokens: config.chat_max_tokens,
    };
    Ok(Some(Arc::new(ChatExtractionClient::new(http, target, settings))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ApiFlavor;
    use httpmock::{Method::POST, MockServer};

    fn client_for(server: &MockServer, flavor: ApiFlavor) -> ChatExtractionClient {
        let http = Client::builder()
            .user_agent("symptom-atlas-test")
            .build()
            .expect("client");
        let target = ApiTarget::new(flavor, server.base_url(), "chat-dep").with_api_key("key");
        ChatExtractionClient::new(http, target, ChatSettings::default())
    }

    #[tokio::test]
    async fn chat_client_returns_message_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .body_contains("fever for two days")
                    .json_body_partial(r#"{"model":"chat-dep"}"#);
                let content = "```json\n{\"symptoms\":[]}\n```";
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": content } }]
                }));
            })
            .await;

        let raw = client_for(&server, ApiFlavor::OpenAI)
            .extract("fever for two days")
            .await
            .expect("content");

        mock.assert();
        assert!(raw.starts_with("```json"));
    }

    #[tokio::test]
    async fn chat_client_handles_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/openai/deployments/chat-dep/chat/completions");
                then.status(500).body("boom");
            })
            .await;

        let error = client_for(&server, ApiFlavor::Azure)
            .extract("cough")
            .await
            .expect_err("error response");

        assert!(matches!(
            &error,
            ExtractionClientError::GenerationFailed(message) if message.contains("500")
        ));
    }

    #[tokio::test]
    async fn chat_client_rejects_empty_choices() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client_for(&server, ApiFlavor::OpenAI)
            .extract("cough")
            .await
            .expect_err("no content");

        assert!(matches!(error, ExtractionClientError::InvalidResponse(_)));
    }
}
