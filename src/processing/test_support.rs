//! In-memory doubles for pipeline tests.

use crate::embedding::{EmbeddingClient, EmbeddingClientError, HashingEmbeddingClient};
use crate::extraction::{ExtractionClient, ExtractionClientError};
use crate::store::{
    DiseaseDocument, DiseaseRecord, DocumentStore, StoreError, StoreHealth, SymptomDocument,
    SymptomMatch, UpsertReceipt,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

const TEST_DIMENSION: usize = 16;

/// Hashing embedder that counts calls and rejects chosen inputs.
#[derive(Default)]
pub struct RecordingEmbedder {
    calls: AtomicUsize,
    reject: Vec<String>,
}

impl RecordingEmbedder {
    pub fn failing_on(inputs: &[&str]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reject: inputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingClient for RecordingEmbedder {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(text) = texts.iter().find(|text| self.reject.contains(text)) {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "rejected {text}"
            )));
        }
        HashingEmbeddingClient::new(TEST_DIMENSION)
            .generate_embeddings(texts)
            .await
    }
}

/// Embedder whose provider is always down.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingClient for FailingEmbedder {
    async fn generate_embeddings(
        &self,
        _texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        Err(EmbeddingClientError::GenerationFailed(
            "provider unreachable".into(),
        ))
    }
}

/// Hashing embedder whose task panics on one input.
pub struct PanickingEmbedder(String);

impl PanickingEmbedder {
    pub fn on(input: &str) -> Self {
        Self(input.to_string())
    }
}

#[async_trait]
impl EmbeddingClient for PanickingEmbedder {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.contains(&self.0) {
            panic!("embedder crashed on {}", self.0);
        }
        HashingEmbeddingClient::new(TEST_DIMENSION)
            .generate_embeddings(texts)
            .await
    }
}

/// Extractor returning a canned completion.
pub struct CannedExtractor(pub Result<String, String>);

#[async_trait]
impl ExtractionClient for CannedExtractor {
    async fn extract(&self, _notes: &str) -> Result<String, ExtractionClientError> {
        self.0
            .clone()
            .map_err(ExtractionClientError::GenerationFailed)
    }
}

#[derive(Default)]
struct Tables {
    symptoms: Vec<(String, SymptomDocument)>,
    diseases: Vec<(String, DiseaseDocument)>,
    next_id: u64,
}

impl Tables {
    fn allocate(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }
}

/// [`DocumentStore`] kept in memory, with switches for failure injection.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    stall_searches: AtomicBool,
    fail_lookups: AtomicBool,
}

impl MemoryStore {
    pub fn stall_searches(&self) {
        self.stall_searches.store(true, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self) {
        self.fail_lookups.store(true, Ordering::SeqCst);
    }

    pub async fn seed_symptom(
        &self,
        embedder: &dyn EmbeddingClient,
        symptom: &str,
        severity: &str,
    ) -> String {
        let vector = embedder.embed(symptom).await.expect("seed embedding");
        self.upsert_symptom(SymptomDocument {
            symptom: symptom.into(),
            severity: severity.into(),
            vector,
            preferred_id: None,
        })
        .await
        .expect("seed symptom")
        .id
    }

    pub async fn symptom_names(&self) -> Vec<String> {
        let tables = self.tables.lock().await;
        tables
            .symptoms
            .iter()
            .map(|(_, doc)| doc.symptom.clone())
            .collect()
    }

    pub async fn disease(&self, name: &str) -> Option<DiseaseDocument> {
        let tables = self.tables.lock().await;
        tables
            .diseases
            .iter()
            .find(|(_, doc)| doc.name == name)
            .map(|(_, doc)| doc.clone())
    }

    fn lookup_guard(&self) -> Result<(), StoreError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Malformed("lookup unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert_symptom(&self, document: SymptomDocument) -> Result<UpsertReceipt, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some((id, existing)) = tables
            .symptoms
            .iter_mut()
            .find(|(_, doc)| doc.symptom == document.symptom)
        {
            *existing = document;
            return Ok(UpsertReceipt {
                id: id.clone(),
                created: false,
            });
        }
        let id = match document.preferred_id.clone() {
            Some(id) => id,
            None => tables.allocate(),
        };
        tables.symptoms.push((id.clone(), document));
        Ok(UpsertReceipt { id, created: true })
    }

    async fn find_symptom_ids(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, String>, StoreError> {
        self.lookup_guard()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .symptoms
            .iter()
            .filter(|(_, doc)| names.contains(&doc.symptom))
            .map(|(id, doc)| (doc.symptom.clone(), id.clone()))
            .collect())
    }

    async fn nearest_symptom(&self, vector: Vec<f32>) -> Result<Option<SymptomMatch>, StoreError> {
        if self.stall_searches.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        let tables = self.tables.lock().await;
        Ok(tables
            .symptoms
            .iter()
            .map(|(id, doc)| {
                let score = doc.vector.iter().zip(&vector).map(|(a, b)| a * b).sum::<f32>();
                SymptomMatch {
                    id: id.clone(),
                    symptom: doc.symptom.clone(),
                    severity: Some(doc.severity.clone()),
                    score,
                }
            })
            .max_by(|a, b| a.score.total_cmp(&b.score)))
    }

    async fn upsert_disease(&self, document: DiseaseDocument) -> Result<UpsertReceipt, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some((id, existing)) = tables
            .diseases
            .iter_mut()
            .find(|(_, doc)| doc.name == document.name)
        {
            *existing = document;
            return Ok(UpsertReceipt {
                id: id.clone(),
                created: false,
            });
        }
        let id = tables.allocate();
        tables.diseases.push((id.clone(), document));
        Ok(UpsertReceipt { id, created: true })
    }

    async fn find_diseases_with_all(
        &self,
        symptom_ids: &[String],
    ) -> Result<Vec<DiseaseRecord>, StoreError> {
        self.lookup_guard()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .diseases
            .iter()
            .filter(|(_, doc)| symptom_ids.iter().all(|id| doc.symptom_ids.contains(id)))
            .map(|(id, doc)| DiseaseRecord {
                id: id.clone(),
                name: doc.name.clone(),
                description: doc.description.clone(),
            })
            .collect())
    }

    async fn health(&self) -> StoreHealth {
        StoreHealth {
            reachable: true,
            collections_present: true,
            error: None,
        }
    }
}
