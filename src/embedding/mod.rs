use crate::config::Config;
use crate::provider::{ApiTarget, ProviderError, http_client};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider returned a vector of the wrong length.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured on the server.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
    /// Client could not be configured.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Produce the embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        self.generate_embeddings(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| {
                EmbeddingClientError::GenerationFailed("provider returned no vectors".to_string())
            })
    }
}

/// Deterministic in-process encoder used for local development and tests.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct an encoder producing vectors of the given length.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return embedding;
        }

        for (idx, byte) in normalized.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

/// Embedding client for OpenAI-compatible and Azure OpenAI endpoints.
pub struct OpenAiEmbeddingClient {
    http: Client,
    target: ApiTarget,
    dimension: usize,
}

impl OpenAiEmbeddingClient {
    /// Build a client against an explicit target.
    pub fn new(http: Client, target: ApiTarget, dimension: usize) -> Self {
        Self {
            http,
            target,
            dimension,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        let expected = texts.len();
        let mut body = json!({ "input": texts });
        if self.target.model_in_body()
            && let Some(map) = body.as_object_mut()
        {
            map.insert("model".into(), Value::String(self.target.model().to_string()));
        }

        tracing::debug!(model = self.target.model(), inputs = expected, "Requesting embeddings");

        let response = self
            .target
            .post(&self.http, "embeddings")
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::GenerationFailed(format!("request failed: {error}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let mut payload: EmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::GenerationFailed(format!("malformed response: {error}"))
        })?;

        if payload.data.len() != expected {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "expected {expected} vectors, got {}",
                payload.data.len()
            )));
        }

        payload.data.sort_by_key(|item| item.index);
        let vectors: Vec<Vec<f32>> = payload.data.into_iter().map(|item| item.embedding).collect();

        if let Some(actual) = vectors
            .iter()
            .map(Vec::len)
            .find(|len| *len != self.dimension)
        {
            return Err(EmbeddingClientError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }

        Ok(vectors)
    }
}

/// Build an embedding client suitable for the current configuration.
pub fn get_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    match ApiTarget::from_config(config, &config.embedding_model)? {
        None => {
            tracing::info!(
                dimension = config.embedding_dimension,
                "Using local hashing embeddings"
            );
            Ok(Arc::new(HashingEmbeddingClient::new(
                config.embedding_dimension,
            )))
        }
        Some(target) => {
            let http = http_client("symptom-atlas/embeddings", config.request_timeout())?;
            Ok(Arc::new(OpenAiEmbeddingClient::new(
                http,
                target,
                config.embedding_dimension,
            )))
        }
    }
}
