//! Symptom pipelines: vectorize-and-store, single search, and paced multi-search.

use crate::embedding::EmbeddingClient;
use crate::processing::batch::{
    BatchPolicy, Labeled, OnBatchError, Outcome, Pacing, elapsed_seconds, run_batches,
};
use crate::processing::types::{
    MAX_INGEST_BATCH_SIZE, MAX_SEARCH_BATCH_SIZE, MAX_SEARCH_QUERIES, MultiSearchReport,
    PipelineError, SearchResult, SymptomError, SymptomInput, VectorizeReport, validate_batch_size,
};
use crate::store::{DocumentStore, SymptomDocument, UpsertReceipt};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Throttling applied to multi-symptom searches.
#[derive(Debug, Clone, Copy)]
pub struct SearchSettings {
    /// Delay between batches.
    pub pacing: Pacing,
    /// Optional deadline for a whole batch.
    pub batch_timeout: Option<Duration>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            pacing: Pacing::Fixed(Duration::from_millis(100)),
            batch_timeout: None,
        }
    }
}

impl SearchSettings {
    fn policy(self) -> BatchPolicy {
        BatchPolicy::default()
            .with_pacing(self.pacing)
            .with_batch_timeout(self.batch_timeout)
            .on_batch_error(OnBatchError::Skip)
    }
}

/// Embed and upsert every symptom, batch by batch.
pub async fn vectorize_symptoms(
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn DocumentStore>,
    symptoms: Vec<SymptomInput>,
    batch_size: usize,
) -> Result<VectorizeReport, PipelineError> {
    let batch_size = validate_batch_size(batch_size, MAX_INGEST_BATCH_SIZE)?;
    let submitted = symptoms.len();

    let report = run_batches(symptoms, batch_size, BatchPolicy::default(), |input| {
        let embedder = embedder.clone();
        let store = store.clone();
        async move { vectorize_one(embedder.as_ref(), store.as_ref(), input).await }
    })
    .await;

    let created = report
        .successes
        .iter()
        .filter(|receipt| receipt.created)
        .count();
    tracing::info!(
        submitted,
        succeeded = report.success_count(),
        failed = report.failed_count(),
        created,
        batches = report.batches,
        elapsed = report.elapsed_seconds,
        "Symptom vectorization completed"
    );

    Ok(VectorizeReport {
        success_count: report.success_count(),
        failed_count: report.failed_count(),
        errors: report
            .failures
            .into_iter()
            .map(|failure| SymptomError {
                symptom: failure.label,
                error: failure.error,
            })
            .collect(),
        processing_time: report.elapsed_seconds,
    })
}

async fn vectorize_one(
    embedder: &dyn EmbeddingClient,
    store: &dyn DocumentStore,
    input: SymptomInput,
) -> Outcome<UpsertReceipt> {
    let SymptomInput {
        symptom,
        severity,
        id,
    } = input;

    let vector = match embedder.embed(&symptom).await {
        Ok(vector) => vector,
        Err(error) => return Outcome::failure(symptom, error),
    };

    let result = store
        .upsert_symptom(SymptomDocument {
            symptom: symptom.clone(),
            severity,
            vector,
            preferred_id: id,
        })
        .await;
    Outcome::from_result(symptom, result)
}

/// Find the closest stored symptom for `query`. Never fails; errors land in the result.
pub async fn search_symptom(
    embedder: &dyn EmbeddingClient,
    store: &dyn DocumentStore,
    query: String,
) -> SearchResult {
    let vector = match embedder.embed(&query).await {
        Ok(vector) => vector,
        Err(error) => {
            tracing::debug!(query = %query, error = %error, "Query embedding failed");
            return SearchResult::failed(query, error);
        }
    };

    match store.nearest_symptom(vector).await {
        Ok(Some(hit)) => SearchResult {
            input_symptom: query,
            matched_symptom: Some(hit.symptom),
            severity: hit.severity,
            id: Some(hit.id),
            score: Some(hit.score),
            error: None,
        },
        Ok(None) => SearchResult::failed(query, "No matching symptom found"),
        Err(error) => {
            tracing::debug!(query = %query, error = %error, "Nearest-neighbor search failed");
            SearchResult::failed(query, error)
        }
    }
}

/// One multi-search query and its position in the request.
struct Query {
    position: usize,
    text: String,
}

impl Labeled for Query {
    fn label(&self) -> String {
        self.text.clone()
    }
}

/// Search many symptoms in paced batches.
///
/// Results follow input order. A query whose task dies still gets a result carrying the error.
pub async fn search_symptoms(
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn DocumentStore>,
    queries: Vec<String>,
    batch_size: usize,
    settings: SearchSettings,
) -> MultiSearchReport {
    let started = Instant::now();

    if let Err(error) = check_queries(&queries, batch_size) {
        tracing::info!(error = %error, "Rejected multi-symptom search");
        return MultiSearchReport::failed(error, elapsed_seconds(started.elapsed()));
    }

    let submitted = queries.len();
    let queries = queries
        .into_iter()
        .enumerate()
        .map(|(position, text)| Query { position, text })
        .collect::<Vec<_>>();
    let report = run_batches(queries, batch_size, settings.policy(), |query: Query| {
        let embedder = embedder.clone();
        let store = store.clone();
        async move {
            let result = search_symptom(embedder.as_ref(), store.as_ref(), query.text).await;
            Outcome::Success((query.position, result))
        }
    })
    .await;

    let total_time = elapsed_seconds(started.elapsed());
    tracing::info!(
        submitted,
        processed = report.success_count(),
        failed = report.failed_count(),
        dropped_batches = report.dropped_batches.len(),
        elapsed = total_time,
        "Multi-symptom search completed"
    );

    let mut results = report.successes;
    for failure in report.failures {
        tracing::warn!(query = %failure.label, error = %failure.error, "Symptom search aborted");
        results.push((
            failure.position,
            SearchResult::failed(failure.label, failure.error),
        ));
    }
    if results.is_empty() {
        return MultiSearchReport::failed("No results were processed successfully", total_time);
    }
    results.sort_by_key(|(position, _)| *position);

    MultiSearchReport {
        processed_count: results.len(),
        results: results.into_iter().map(|(_, result)| result).collect(),
        total_time,
        error: None,
    }
}

fn check_queries(queries: &[String], batch_size: usize) -> Result<(), PipelineError> {
    if queries.is_empty() {
        return Err(PipelineError::EmptyInput("No symptoms provided"));
    }
    if queries.len() > MAX_SEARCH_QUERIES {
        return Err(PipelineError::TooManyQueries {
            count: queries.len(),
            max: MAX_SEARCH_QUERIES,
        });
    }
    validate_batch_size(batch_size, MAX_SEARCH_BATCH_SIZE).map(|_| ())
}
