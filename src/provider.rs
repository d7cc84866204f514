//! Endpoint and credential handling shared by the hosted embedding and chat clients.
//!
//! OpenAI-compatible APIs address models in the request body and authenticate with a bearer
//! token. Azure OpenAI addresses a deployment in the URL path, requires an `api-version` query
//! parameter, and authenticates with an `api-key` header.

use crate::config::{Config, EmbeddingProvider};
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while assembling a hosted model target.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A required setting was absent for the chosen provider.
    #[error("Missing provider setting: {0}")]
    MissingSetting(&'static str),
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Flavor of hosted API the target speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `{base}/v1/{operation}` with bearer auth.
    OpenAI,
    /// `{base}/openai/deployments/{model}/{operation}?api-version=..` with `api-key` auth.
    Azure,
}

/// Fully resolved hosted model endpoint.
#[derive(Debug, Clone)]
pub struct ApiTarget {
    pub(crate) flavor: ApiFlavor,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) api_version: String,
    pub(crate) model: String,
}

impl ApiTarget {
    /// Build a target for the given model from configuration.
    ///
    /// Returns `Ok(None)` for the local provider, which never calls out.
    pub fn from_config(config: &Config, model: &str) -> Result<Option<Self>, ProviderError> {
        let flavor = match config.embedding_provider {
            EmbeddingProvider::Local => return Ok(None),
            EmbeddingProvider::OpenAI => ApiFlavor::OpenAI,
            EmbeddingProvider::Azure => ApiFlavor::Azure,
        };
        let base_url = config
            .llm_endpoint
            .clone()
            .ok_or(ProviderError::MissingSetting("LLM_ENDPOINT"))?;
        if flavor == ApiFlavor::Azure && config.llm_api_key.is_none() {
            return Err(ProviderError::MissingSetting("LLM_API_KEY"));
        }
        Ok(Some(Self {
            flavor,
            base_url,
            api_key: config.llm_api_key.clone(),
            api_version: config.llm_api_version.clone(),
            model: model.to_string(),
        }))
    }

    /// Construct a target directly, mainly for tests and embedding callers.
    pub fn new(flavor: ApiFlavor, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            flavor,
            base_url: base_url.into(),
            api_key: None,
            api_version: "2024-02-01".to_string(),
            model: model.into(),
        }
    }

    /// Attach a credential.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Model identifier or Azure deployment name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether the request body must carry the model name.
    pub fn model_in_body(&self) -> bool {
        self.flavor == ApiFlavor::OpenAI
    }

    /// Resolve the URL for an operation such as `embeddings` or `chat/completions`.
    pub fn endpoint(&self, operation: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let operation = operation.trim_start_matches('/');
        match self.flavor {
            ApiFlavor::OpenAI => {
                if base.ends_with("/v1") {
                    format!("{base}/{operation}")
                } else {
                    format!("{base}/v1/{operation}")
                }
            }
            ApiFlavor::Azure => format!(
                "{base}/openai/deployments/{}/{operation}?api-version={}",
                self.model, self.api_version
            ),
        }
    }

    /// Start a POST request with the right authentication header.
    pub fn post(&self, client: &Client, operation: &str) -> RequestBuilder {
        let request = client.post(self.endpoint(operation));
        match (&self.api_key, self.flavor) {
            (Some(key), ApiFlavor::Azure) if !key.is_empty() => request.header("api-key", key),
            (Some(key), ApiFlavor::OpenAI) if !key.is_empty() => request.bearer_auth(key),
            _ => request,
        }
    }
}

/// Build the shared outbound HTTP client with a bounded per-request timeout.
pub fn http_client(user_agent: &str, timeout: Duration) -> Result<Client, ProviderError> {
    Ok(Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?)
}
