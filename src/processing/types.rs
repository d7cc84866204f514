//! Request and report types shared by the pipelines and the HTTP surface.

use crate::extraction::{ExtractionClientError, ParseError};
use crate::processing::batch::Labeled;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default ingestion batch size.
pub const DEFAULT_INGEST_BATCH_SIZE: usize = 100;
/// Largest accepted ingestion batch size.
pub const MAX_INGEST_BATCH_SIZE: usize = 1000;
/// Default multi-symptom search batch size.
pub const DEFAULT_SEARCH_BATCH_SIZE: usize = 5;
/// Largest accepted search batch size.
pub const MAX_SEARCH_BATCH_SIZE: usize = 20;
/// Ceiling on queries per multi-symptom search.
pub const MAX_SEARCH_QUERIES: usize = 100;
/// Batch size used when searching symptoms extracted from notes.
pub const NOTES_SEARCH_BATCH_SIZE: usize = 10;

/// Failures that stop a pipeline before any batch runs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Nothing to process.
    #[error("{0}")]
    EmptyInput(&'static str),
    /// Too many queries in one request.
    #[error("Too many symptoms: {count} provided, maximum is {max}")]
    TooManyQueries {
        /// Submitted query count.
        count: usize,
        /// Allowed maximum.
        max: usize,
    },
    /// Batch size outside the accepted range.
    #[error("batch_size must be between 1 and {max}, got {value}")]
    InvalidBatchSize {
        /// Submitted value.
        value: usize,
        /// Allowed maximum.
        max: usize,
    },
    /// No extraction backend is configured.
    #[error("Symptom extraction is not configured")]
    ExtractionUnavailable,
    /// Extraction call failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionClientError),
    /// Extraction output could not be recovered.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Check a batch size against `1..=max`.
pub fn validate_batch_size(value: usize, max: usize) -> Result<usize, PipelineError> {
    if (1..=max).contains(&value) {
        Ok(value)
    } else {
        Err(PipelineError::InvalidBatchSize { value, max })
    }
}

/// Symptom submitted for vectorization.
#[derive(Debug, Clone, Deserialize)]
pub struct SymptomInput {
    /// Symptom text; also the natural key.
    pub symptom: String,
    /// Severity label, e.g. `"2"`.
    pub severity: String,
    /// Identifier to use if the symptom is new, sent as `id` or `_id`.
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
}

impl Labeled for SymptomInput {
    fn label(&self) -> String {
        self.symptom.clone()
    }
}

/// Disease submitted for creation.
#[derive(Debug, Clone, Deserialize)]
pub struct DiseaseInput {
    /// Disease name; also the natural key.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Names of symptoms that must already be stored.
    pub symptoms: Vec<String>,
}

impl Labeled for DiseaseInput {
    fn label(&self) -> String {
        self.name.clone()
    }
}

/// Per-symptom ingestion failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymptomError {
    /// Symptom text.
    pub symptom: String,
    /// Rendered error.
    pub error: String,
}

/// Per-disease ingestion failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiseaseError {
    /// Disease name, when the failure is attributable to one.
    pub disease: Option<String>,
    /// Rendered error.
    pub error: String,
}

/// Report for a symptom vectorization request.
#[derive(Debug, Clone, Serialize)]
pub struct VectorizeReport {
    /// Symptoms written.
    pub success_count: usize,
    /// Symptoms that failed.
    pub failed_count: usize,
    /// Failures in processing order.
    pub errors: Vec<SymptomError>,
    /// Seconds spent, millisecond precision.
    pub processing_time: f64,
}

/// Report for a disease batch request.
#[derive(Debug, Clone, Serialize)]
pub struct DiseaseBatchReport {
    /// Diseases written.
    pub success_count: usize,
    /// Diseases that failed.
    pub failed_count: usize,
    /// Failures in processing order.
    pub errors: Vec<DiseaseError>,
    /// Seconds spent, millisecond precision.
    pub processing_time: f64,
}

/// Outcome of one symptom search. Match fields are all absent when `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Query as submitted.
    pub input_symptom: String,
    /// Closest stored symptom.
    pub matched_symptom: Option<String>,
    /// Severity of the match.
    pub severity: Option<String>,
    /// Store identifier of the match.
    pub id: Option<String>,
    /// Similarity score.
    pub score: Option<f32>,
    /// Why no match was returned.
    pub error: Option<String>,
}

impl SearchResult {
    /// Result carrying only an error.
    pub fn failed(input: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            input_symptom: input.into(),
            matched_symptom: None,
            severity: None,
            id: None,
            score: None,
            error: Some(error.to_string()),
        }
    }
}

/// Report for a multi-symptom search or notes conversion.
#[derive(Debug, Clone, Serialize)]
pub struct MultiSearchReport {
    /// One result per processed query.
    pub results: Vec<SearchResult>,
    /// Seconds spent, millisecond precision.
    pub total_time: f64,
    /// Number of results returned.
    pub processed_count: usize,
    /// Top-level failure.
    pub error: Option<String>,
}

impl MultiSearchReport {
    /// Report for a request that failed before or instead of producing results.
    pub fn failed(error: impl std::fmt::Display, total_time: f64) -> Self {
        Self {
            results: Vec::new(),
            total_time,
            processed_count: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Disease returned by an exact symptom match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiseaseMatch {
    /// Disease name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Store identifier.
    pub id: String,
}

/// Report for an exact disease match.
#[derive(Debug, Clone, Serialize)]
pub struct DiseasesMatchReport {
    /// Matching diseases.
    pub diseases: Vec<DiseaseMatch>,
    /// Number of matches.
    pub count: usize,
    /// Lookup failure, if any.
    pub error: Option<String>,
}
