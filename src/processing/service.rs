//! Processing service wiring the pipelines to their shared clients and store.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, EmbeddingClientError, get_embedding_client},
    extraction::{ExtractionClient, get_extraction_client},
    metrics::{MetricsSnapshot, ServiceMetrics},
    processing::{
        batch::Pacing,
        diseases, notes,
        symptoms::{self, SearchSettings},
        types::{
            DiseaseBatchReport, DiseaseInput, DiseasesMatchReport, MultiSearchReport,
            PipelineError, SearchResult, SymptomInput, VectorizeReport,
        },
    },
    provider::ProviderError,
    store::{DocumentStore, QdrantStore, StoreError, StoreHealth},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failures while assembling the service at startup.
#[derive(Debug, Error)]
pub enum ServiceInitError {
    /// Embedding client could not be built.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Extraction client could not be built.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Store could not be reached or prepared.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns the long-lived embedding client, extraction client, document store, and metrics.
///
/// Construct once near process start and share through an `Arc`; every HTTP handler goes through
/// [`ProcessingApi`].
pub struct ProcessingService {
    embedder: Arc<dyn EmbeddingClient>,
    extractor: Option<Arc<dyn ExtractionClient>>,
    store: Arc<dyn DocumentStore>,
    search: SearchSettings,
    metrics: Arc<ServiceMetrics>,
}

/// Operations exposed to the HTTP surface.
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Embed and store symptoms.
    async fn vectorize_symptoms(
        &self,
        symptoms: Vec<SymptomInput>,
        batch_size: usize,
    ) -> Result<VectorizeReport, PipelineError>;

    /// Store diseases whose symptoms are already known.
    async fn create_diseases(
        &self,
        diseases: Vec<DiseaseInput>,
        batch_size: usize,
    ) -> Result<DiseaseBatchReport, PipelineError>;

    /// Diseases associated with all given symptom ids.
    async fn find_diseases(
        &self,
        symptom_ids: Vec<String>,
    ) -> Result<DiseasesMatchReport, PipelineError>;

    /// Closest stored symptom for one query.
    async fn search_symptom(&self, query: String) -> SearchResult;

    /// Closest stored symptom for each query.
    async fn search_symptoms(&self, queries: Vec<String>, batch_size: usize) -> MultiSearchReport;

    /// Extract symptoms from notes and search each one.
    async fn convert_notes(&self, notes: String) -> MultiSearchReport;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;

    /// Probe the document store.
    async fn health(&self) -> StoreHealth;
}

impl ProcessingService {
    /// Build the service from configuration, connecting to Qdrant and preparing collections.
    pub async fn new(config: &Config) -> Result<Self, ServiceInitError> {
        tracing::info!(provider = ?config.embedding_provider, "Initializing embedding client");
        let embedder = get_embedding_client(config)?;
        let extractor = get_extraction_client(config)?;
        tracing::info!(
            extraction = extractor.is_some(),
            "Provider clients initialized"
        );

        tracing::debug!(
            symptoms = %config.symptoms_collection,
            diseases = %config.diseases_collection,
            "Ensuring collections"
        );
        let store = Arc::new(QdrantStore::connect(config).await?);

        let search = SearchSettings {
            pacing: Pacing::Fixed(Duration::from_millis(config.search_pacing_ms)),
            batch_timeout: config.search_batch_timeout_secs.map(Duration::from_secs),
        };
        Ok(Self::from_parts(embedder, extractor, store, search))
    }

    /// Assemble the service from already-built parts.
    pub fn from_parts(
        embedder: Arc<dyn EmbeddingClient>,
        extractor: Option<Arc<dyn ExtractionClient>>,
        store: Arc<dyn DocumentStore>,
        search: SearchSettings,
    ) -> Self {
        Self {
            embedder,
            extractor,
            store,
            search,
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }

    /// Shared metrics registry.
    pub fn metrics(&self) -> Arc<ServiceMetrics> {
        self.metrics.clone()
    }

    fn record_search_report(&self, report: &MultiSearchReport) {
        let answered = report.results.iter().filter(|r| r.error.is_none()).count();
        self.metrics.record_searches(answered as u64);
    }
}

#[async_trait]
impl ProcessingApi for ProcessingService {
    async fn vectorize_symptoms(
        &self,
        symptoms: Vec<SymptomInput>,
        batch_size: usize,
    ) -> Result<VectorizeReport, PipelineError> {
        let report = symptoms::vectorize_symptoms(
            self.embedder.clone(),
            self.store.clone(),
            symptoms,
            batch_size,
        )
        .await?;
        self.metrics.record_symptoms(report.success_count as u64);
        Ok(report)
    }

    async fn create_diseases(
        &self,
        diseases: Vec<DiseaseInput>,
        batch_size: usize,
    ) -> Result<DiseaseBatchReport, PipelineError> {
        let report = diseases::create_diseases(self.store.clone(), diseases, batch_size).await?;
        self.metrics.record_diseases(report.success_count as u64);
        Ok(report)
    }

    async fn find_diseases(
        &self,
        symptom_ids: Vec<String>,
    ) -> Result<DiseasesMatchReport, PipelineError> {
        diseases::find_diseases(self.store.as_ref(), symptom_ids).await
    }

    async fn search_symptom(&self, query: String) -> SearchResult {
        let result =
            symptoms::search_symptom(self.embedder.as_ref(), self.store.as_ref(), query).await;
        if result.error.is_none() {
            self.metrics.record_searches(1);
        }
        result
    }

    async fn search_symptoms(&self, queries: Vec<String>, batch_size: usize) -> MultiSearchReport {
        let report = symptoms::search_symptoms(
            self.embedder.clone(),
            self.store.clone(),
            queries,
            batch_size,
            self.search,
        )
        .await;
        self.record_search_report(&report);
        report
    }

    async fn convert_notes(&self, notes: String) -> MultiSearchReport {
        let report = notes::convert_notes(
            self.extractor.clone(),
            self.embedder.clone(),
            self.store.clone(),
            &notes,
            self.search,
        )
        .await;
        self.metrics.record_notes();
        self.record_search_report(&report);
        report
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn health(&self) -> StoreHealth {
        self.store.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::test_support::{MemoryStore, RecordingEmbedder};

    fn service(store: Arc<MemoryStore>) -> ProcessingService {
        ProcessingService::from_parts(
            Arc::new(RecordingEmbedder::default()),
            None,
            store,
            SearchSettings {
                pacing: Pacing::None,
                batch_timeout: None,
            },
        )
    }

    #[tokio::test]
    async fn operations_update_metrics() {
        let service = service(Arc::new(MemoryStore::default()));
        service
            .vectorize_symptoms(
                vec![SymptomInput {
                    symptom: "fever".into(),
                    severity: "2".into(),
                    id: None,
                }],
                10,
            )
            .await
            .expect("vectorize");
        service
            .create_diseases(
                vec![DiseaseInput {
                    name: "flu".into(),
                    description: "viral".into(),
                    symptoms: vec!["fever".into()],
                }],
                10,
            )
            .await
            .expect("diseases");
        service
            .search_symptoms(vec!["fever".into(), "fever".into()], 5)
            .await;
        service.convert_notes("fever".into()).await;

        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.symptoms_vectorized, 1);
        assert_eq!(snapshot.diseases_stored, 1);
        assert_eq!(snapshot.searches_served, 2);
        assert_eq!(snapshot.notes_converted, 1);
    }

    #[tokio::test]
    async fn health_delegates_to_store() {
        let health = service(Arc::new(MemoryStore::default())).health().await;
        assert!(health.reachable);
        assert!(health.collections_present);
    }
}
