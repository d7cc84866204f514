use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Symptom Atlas server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores symptom and disease documents.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Collection holding vectorized symptoms.
    pub symptoms_collection: String,
    /// Collection holding disease documents.
    pub diseases_collection: String,
    /// Backend used to generate embeddings and, when hosted, run extraction.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model (or Azure deployment) identifier.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the hosted model API (OpenAI-compatible or Azure resource endpoint).
    pub llm_endpoint: Option<String>,
    /// Credential for the hosted model API.
    pub llm_api_key: Option<String>,
    /// `api-version` query parameter sent to Azure deployments.
    pub llm_api_version: String,
    /// Chat model (or Azure deployment) used for symptom extraction.
    pub chat_model: Option<String>,
    /// Sampling temperature for extraction requests.
    pub chat_temperature: f32,
    /// Completion token ceiling for extraction requests.
    pub chat_max_tokens: u32,
    /// Upper bound for any single outbound HTTP call.
    pub request_timeout_secs: u64,
    /// Delay inserted between consecutive search batches.
    pub search_pacing_ms: u64,
    /// Optional deadline for one whole search batch.
    pub search_batch_timeout_secs: Option<u64>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported model backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI-compatible API (`/v1/embeddings`, `/v1/chat/completions`).
    OpenAI,
    /// Azure OpenAI deployments addressed by name and `api-version`.
    Azure,
    /// Deterministic in-process encoder; no extraction support.
    Local,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            symptoms_collection: load_env_optional("SYMPTOMS_COLLECTION")
                .unwrap_or_else(|| "symptoms".to_string()),
            diseases_collection: load_env_optional("DISEASES_COLLECTION")
                .unwrap_or_else(|| "diseases".to_string()),
            embedding_provider: load_env("EMBEDDING_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            llm_endpoint: load_env_optional("LLM_ENDPOINT"),
            llm_api_key: load_env_optional("LLM_API_KEY"),
            llm_api_version: load_env_optional("LLM_API_VERSION")
                .unwrap_or_else(|| "2024-02-01".to_string()),
            chat_model: load_env_optional("CHAT_MODEL"),
            chat_temperature: parse_optional("CHAT_TEMPERATURE")?.unwrap_or(0.0),
            chat_max_tokens: parse_optional("CHAT_MAX_TOKENS")?.unwrap_or(1024),
            request_timeout_secs: parse_optional("REQUEST_TIMEOUT_SECS")?.unwrap_or(30),
            search_pacing_ms: parse_optional("SEARCH_PACING_MS")?.unwrap_or(100),
            search_batch_timeout_secs: parse_optional("SEARCH_BATCH_TIMEOUT_SECS")?,
            server_port: parse_optional("SERVER_PORT")?,
        })
    }

    /// Timeout applied to every outbound HTTP request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "azure" => Ok(Self::Azure),
            "local" => Ok(Self::Local),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<(), ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        symptoms = %config.symptoms_collection,
        diseases = %config.diseases_collection,
        server_port = ?config.server_port,
        embedding_provider = ?config.embedding_provider,
        "Loaded configuration"
    );
    // A second initialization keeps the first snapshot.
    let _ = CONFIG.set(config);
    Ok(())
}
