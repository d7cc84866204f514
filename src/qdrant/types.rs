//! Shared types used by the Qdrant client and helpers.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// Point identifier is neither a UUID nor an unsigned integer.
    #[error("Invalid point id: {0}")]
    InvalidPointId(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Distance metric configured on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    /// Cosine similarity; used for symptom vectors.
    Cosine,
    /// Dot product.
    Dot,
}

impl Distance {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "Cosine",
            Self::Dot => "Dot",
        }
    }
}

/// Scored payload returned by Qdrant queries.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Identifier assigned to the vector.
    pub id: String,
    /// Similarity score computed by Qdrant.
    pub score: f32,
    /// Optional payload associated with the vector.
    pub payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResponse {
    pub(crate) result: ListCollectionsResult,
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResult {
    pub(crate) collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
pub(crate) struct CollectionDescription {
    pub(crate) name: String,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResponse {
    pub(crate) result: ScrollResult,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResult {
    #[serde(default)]
    pub(crate) points: Vec<ScrollPoint>,
    #[serde(default)]
    pub(crate) next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollPoint {
    #[serde(default)]
    pub(crate) id: Option<Value>,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
