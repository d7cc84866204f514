#![deny(missing_docs)]

//! Core library for the Symptom Atlas server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Symptom extraction from free-text notes.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Service counters.
pub mod metrics;
/// Batch orchestration and the symptom and disease pipelines.
pub mod processing;
/// Shared addressing for OpenAI-compatible and Azure model endpoints.
pub mod provider;
/// Qdrant vector store integration.
pub mod qdrant;
/// Document store capability consumed by the pipelines.
pub mod store;
