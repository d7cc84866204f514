//! Free-text notes to matched symptoms.

use crate::embedding::EmbeddingClient;
use crate::extraction::{ExtractionClient, parse_extraction};
use crate::processing::batch::elapsed_seconds;
use crate::processing::symptoms::{SearchSettings, search_symptoms};
use crate::processing::types::{MultiSearchReport, NOTES_SEARCH_BATCH_SIZE, PipelineError};
use crate::store::DocumentStore;
use std::sync::Arc;
use std::time::Instant;

/// Extract symptom labels from `notes` and search each one.
///
/// Extraction and parse failures come back as a report with `error` set and no results; once
/// labels exist the report is whatever [`search_symptoms`] produced for them.
pub async fn convert_notes(
    extractor: Option<Arc<dyn ExtractionClient>>,
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn DocumentStore>,
    notes: &str,
    settings: SearchSettings,
) -> MultiSearchReport {
    let started = Instant::now();

    let labels = match extract_labels(extractor.as_deref(), notes).await {
        Ok(labels) => labels,
        Err(error) => {
            tracing::warn!(error = %error, "Notes conversion failed before search");
            return MultiSearchReport::failed(error, elapsed_seconds(started.elapsed()));
        }
    };
    tracing::debug!(extracted = labels.len(), "Symptoms extracted from notes");

    search_symptoms(embedder, store, labels, NOTES_SEARCH_BATCH_SIZE, settings).await
}

async fn extract_labels(
    extractor: Option<&dyn ExtractionClient>,
    notes: &str,
) -> Result<Vec<String>, PipelineError> {
    if notes.trim().is_empty() {
        return Err(PipelineError::EmptyInput("No notes provided"));
    }
    let extractor = extractor.ok_or(PipelineError::ExtractionUnavailable)?;
    let raw = extractor.extract(notes).await?;
    Ok(parse_extraction(&raw)?.labels())
}
