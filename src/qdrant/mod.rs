//! Qdrant vector store integration.

pub mod client;
pub mod filters;
pub(crate) mod payload;
pub mod types;

pub use client::QdrantService;
pub use types::{Distance, QdrantError, ScoredPoint};
