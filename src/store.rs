//! Document store capability used by the pipelines, and its Qdrant implementation.
//!
//! Pipelines only see [`DocumentStore`]: upsert by natural key, filter lookups, and
//! nearest-neighbor search. Symptoms live in one collection keyed by symptom text; diseases in
//! another keyed by name. Upserts resolve the natural key to an existing point first so an
//! update keeps the stored identifier and only a new key receives a fresh one.

use crate::config::Config;
use crate::qdrant::{
    Distance, QdrantError, QdrantService, ScoredPoint, filters,
    payload::{
        build_disease_payload, build_symptom_payload, current_timestamp_rfc3339,
        generate_point_id, payload_str, point_id_value,
    },
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

const SYMPTOM_KEY: &str = "symptom";
const DISEASE_KEY: &str = "name";
const DISEASE_SYMPTOM_IDS: &str = "symptom_ids";
// Disease documents carry no embedding; Qdrant still requires one vector per point.
const DISEASE_PLACEHOLDER_VECTOR: [f32; 1] = [1.0];

/// Errors raised by document store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend request failed.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// Backend returned a document missing required fields.
    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// Symptom ready to be written.
#[derive(Debug, Clone)]
pub struct SymptomDocument {
    /// Natural key.
    pub symptom: String,
    /// Caller-supplied severity label.
    pub severity: String,
    /// Embedding of `symptom`.
    pub vector: Vec<f32>,
    /// Identifier to use if the key is new.
    pub preferred_id: Option<String>,
}

/// Disease ready to be written.
#[derive(Debug, Clone)]
pub struct DiseaseDocument {
    /// Natural key.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Resolved symptom identifiers, in the order the symptoms were listed.
    pub symptom_ids: Vec<String>,
    /// Symptom names as submitted.
    pub symptom_names: Vec<String>,
}

/// Result of an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertReceipt {
    /// Identifier of the stored document.
    pub id: String,
    /// Whether the natural key was new.
    pub created: bool,
}

/// Closest stored symptom for a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SymptomMatch {
    /// Store identifier.
    pub id: String,
    /// Stored symptom text.
    pub symptom: String,
    /// Stored severity.
    pub severity: Option<String>,
    /// Similarity score.
    pub score: f32,
}

/// Disease summary returned by lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiseaseRecord {
    /// Store identifier.
    pub id: String,
    /// Disease name.
    pub name: String,
    /// Description.
    pub description: String,
}

/// Reachability snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    /// Backend answered.
    pub reachable: bool,
    /// Both collections exist.
    pub collections_present: bool,
    /// Diagnostic when unreachable.
    pub error: Option<String>,
}

/// Capability consumed by the pipelines.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or update a symptom keyed by its text.
    async fn upsert_symptom(&self, document: SymptomDocument) -> Result<UpsertReceipt, StoreError>;

    /// Map each stored symptom name among `names` to its identifier.
    async fn find_symptom_ids(&self, names: &[String])
    -> Result<HashMap<String, String>, StoreError>;

    /// Closest stored symptom to `vector`, if any.
    async fn nearest_symptom(&self, vector: Vec<f32>) -> Result<Option<SymptomMatch>, StoreError>;

    /// Insert or update a disease keyed by its name.
    async fn upsert_disease(&self, document: DiseaseDocument) -> Result<UpsertReceipt, StoreError>;

    /// Diseases whose symptom ids include every id in `symptom_ids`.
    async fn find_diseases_with_all(
        &self,
        symptom_ids: &[String],
    ) -> Result<Vec<DiseaseRecord>, StoreError>;

    /// Probe the backend.
    async fn health(&self) -> StoreHealth;
}

/// [`DocumentStore`] backed by two Qdrant collections.
pub struct QdrantStore {
    service: QdrantService,
    symptoms: String,
    diseases: String,
}

impl QdrantStore {
    /// Wrap an existing client without touching the backend.
    pub fn new(
        service: QdrantService,
        symptoms: impl Into<String>,
        diseases: impl Into<String>,
    ) -> Self {
        Self {
            service,
            symptoms: symptoms.into(),
            diseases: diseases.into(),
        }
    }

    /// Build the store from configuration and make sure both collections and their indexes exist.
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let service = QdrantService::new(config)?;
        let store = Self::new(
            service,
            config.symptoms_collection.clone(),
            config.diseases_collection.clone(),
        );
        store.ensure_collections(config.embedding_dimension as u64).await?;
        Ok(store)
    }

    /// Create missing collections and keyword indexes on the lookup fields.
    pub async fn ensure_collections(&self, vector_size: u64) -> Result<(), StoreError> {
        self.service
            .create_collection_if_not_exists(&self.symptoms, vector_size, Distance::Cosine)
            .await?;
        self.service
            .ensure_payload_indexes(&self.symptoms, &[SYMPTOM_KEY])
            .await?;
        self.service
            .create_collection_if_not_exists(
                &self.diseases,
                DISEASE_PLACEHOLDER_VECTOR.len() as u64,
                Distance::Dot,
            )
            .await?;
        self.service
            .ensure_payload_indexes(&self.diseases, &[DISEASE_KEY, DISEASE_SYMPTOM_IDS])
            .await?;
        tracing::debug!(
            symptoms = %self.symptoms,
            diseases = %self.diseases,
            "Collections ready"
        );
        Ok(())
    }

    async fn existing_id(
        &self,
        collection: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<String>, StoreError> {
        let points = self
            .service
            .scroll_points(
                collection,
                json!(false),
                Some(filters::match_value(key, value)),
                Some(1),
            )
            .await?;
        Ok(points.into_iter().next().map(|(id, _)| id))
    }

    async fn resolve_id(
        &self,
        collection: &str,
        key: &str,
        value: &str,
        preferred: Option<&str>,
    ) -> Result<UpsertReceipt, StoreError> {
        if let Some(id) = self.existing_id(collection, key, value).await? {
            return Ok(UpsertReceipt { id, created: false });
        }
        let id = match preferred {
            Some(candidate) if point_id_value(candidate).is_some() => candidate.trim().to_string(),
            Some(candidate) => {
                tracing::debug!(candidate, "Ignoring preferred id that Qdrant cannot store");
                generate_point_id()
            }
            None => generate_point_id(),
        };
        Ok(UpsertReceipt { id, created: true })
    }
}

#[async_trait]
impl DocumentStore for QdrantStore {
    async fn upsert_symptom(&self, document: SymptomDocument) -> Result<UpsertReceipt, StoreError> {
        let SymptomDocument {
            symptom,
            severity,
            vector,
            preferred_id,
        } = document;
        let receipt = self
            .resolve_id(&self.symptoms, SYMPTOM_KEY, &symptom, preferred_id.as_deref())
            .await?;
        let payload = build_symptom_payload(&symptom, &severity, &current_timestamp_rfc3339());
        self.service
            .upsert_point(&self.symptoms, &receipt.id, vector, payload)
            .await?;
        Ok(receipt)
    }

    async fn find_symptom_ids(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, String>, StoreError> {
        let Some(filter) = filters::match_any(SYMPTOM_KEY, names) else {
            return Ok(HashMap::new());
        };
        let points = self
            .service
            .scroll_points(&self.symptoms, json!([SYMPTOM_KEY]), Some(filter), None)
            .await?;
        Ok(points
            .into_iter()
            .filter_map(|(id, payload)| payload_str(&payload, SYMPTOM_KEY).map(|name| (name, id)))
            .collect())
    }

    async fn nearest_symptom(&self, vector: Vec<f32>) -> Result<Option<SymptomMatch>, StoreError> {
        let hits = self
            .service
            .search_points(&self.symptoms, vector, None, 1, None)
            .await?;
        hits.into_iter().next().map(map_symptom_hit).transpose()
    }

    async fn upsert_disease(&self, document: DiseaseDocument) -> Result<UpsertReceipt, StoreError> {
        let receipt = self
            .resolve_id(&self.diseases, DISEASE_KEY, &document.name, None)
            .await?;
        let payload = build_disease_payload(
            &document.name,
            &document.description,
            &document.symptom_ids,
            &document.symptom_names,
            &current_timestamp_rfc3339(),
        );
        self.service
            .upsert_point(
                &self.diseases,
                &receipt.id,
                DISEASE_PLACEHOLDER_VECTOR.to_vec(),
                payload,
            )
            .await?;
        Ok(receipt)
    }

    async fn find_diseases_with_all(
        &self,
        symptom_ids: &[String],
    ) -> Result<Vec<DiseaseRecord>, StoreError> {
        let Some(filter) = filters::contains_all(DISEASE_SYMPTOM_IDS, symptom_ids) else {
            return Ok(Vec::new());
        };
        let points = self
            .service
            .scroll_points(
                &self.diseases,
                json!(["name", "description"]),
                Some(filter),
                None,
            )
            .await?;
        points
            .into_iter()
            .map(|(id, payload)| {
                let name = payload_str(&payload, "name")
                    .ok_or_else(|| StoreError::Malformed(format!("disease {id} has no name")))?;
                Ok(DiseaseRecord {
                    id,
                    name,
                    description: payload_str(&payload, "description").unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn health(&self) -> StoreHealth {
        match self.service.list_collections().await {
            Ok(collections) => StoreHealth {
                reachable: true,
                collections_present: [&self.symptoms, &self.diseases]
                    .iter()
                    .all(|wanted| collections.iter().any(|name| name == *wanted)),
                error: None,
            },
            Err(error) => {
                tracing::warn!(error = %error, "Qdrant health check failed");
                StoreHealth {
                    reachable: false,
                    collections_present: false,
                    error: Some(error.to_string()),
                }
            }
        }
    }
}

fn map_symptom_hit(point: ScoredPoint) -> Result<SymptomMatch, StoreError> {
    let ScoredPoint { id, score, payload } = point;
    let payload = payload.unwrap_or_default();
    let symptom = payload_str(&payload, SYMPTOM_KEY)
        .ok_or_else(|| StoreError::Malformed(format!("symptom {id} has no text")))?;
    Ok(SymptomMatch {
        id,
        symptom,
        severity: payload_str(&payload, "severity"),
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qdrant::client::tests::service_for;
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };

    fn store_for(server: &MockServer) -> QdrantStore {
        QdrantStore::new(service_for(server), "symptoms", "diseases")
    }

    #[tokio::test]
    async fn upsert_symptom_reuses_existing_id() {
        let server = MockServer::start_async().await;
        let existing = "6a1c1b8e-0a43-4b55-8d2f-8f0c5c2d9e11";
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/symptoms/points/scroll")
                    .body_contains("fever");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [ { "id": existing, "payload": null } ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;
        let write = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/symptoms/points")
                    .body_contains(existing)
                    .body_contains("vectorized_at");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        let receipt = store_for(&server)
            .upsert_symptom(SymptomDocument {
                symptom: "fever".into(),
                severity: "2".into(),
                vector: vec![0.1, 0.2],
                preferred_id: None,
            })
            .await
            .expect("upsert");

        write.assert();
        assert_eq!(
            receipt,
            UpsertReceipt {
                id: existing.to_string(),
                created: false
            }
        );
    }

    #[tokio::test]
    async fn upsert_symptom_uses_valid_preferred_id_for_new_key() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/symptoms/points/scroll");
                then.status(200).json_body(json!({
                    "result": { "points": [], "next_page_offset": null }
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/symptoms/points");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        let receipt = store_for(&server)
            .upsert_symptom(SymptomDocument {
                symptom: "cough".into(),
                severity: "1".into(),
                vector: vec![0.3],
                preferred_id: Some("99".into()),
            })
            .await
            .expect("upsert");

        assert_eq!(receipt.id, "99");
        assert!(receipt.created);
    }

    #[tokio::test]
    async fn find_symptom_ids_maps_names() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/symptoms/points/scroll")
                    .body_contains("\"any\"");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "id": 1, "payload": { "symptom": "fever" } },
                            { "id": 2, "payload": { "symptom": "cough" } }
                        ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;

        let ids = store_for(&server)
            .find_symptom_ids(&["fever".into(), "cough".into(), "rash".into()])
            .await
            .expect("lookup");

        assert_eq!(ids.get("fever").map(String::as_str), Some("1"));
        assert_eq!(ids.get("cough").map(String::as_str), Some("2"));
        assert!(!ids.contains_key("rash"));
    }

    #[tokio::test]
    async fn nearest_symptom_handles_empty_results() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/symptoms/points/query");
                then.status(200).json_body(json!({ "result": { "points": [] } }));
            })
            .await;

        let hit = store_for(&server)
            .nearest_symptom(vec![0.0, 1.0])
            .await
            .expect("search");
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn find_diseases_requires_every_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/diseases/points/scroll")
                    .body_contains("\"value\":\"a\"")
                    .body_contains("\"value\":\"b\"");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "id": 5, "payload": { "name": "flu", "description": "viral" } }
                        ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;

        let diseases = store_for(&server)
            .find_diseases_with_all(&["a".into(), "b".into()])
            .await
            .expect("lookup");

        mock.assert();
        assert_eq!(
            diseases,
            vec![DiseaseRecord {
                id: "5".into(),
                name: "flu".into(),
                description: "viral".into()
            }]
        );
    }

    #[tokio::test]
    async fn health_reports_missing_collections() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections");
                then.status(200).json_body(json!({
                    "result": { "collections": [ { "name": "symptoms" } ] }
                }));
            })
            .await;

        let health = store_for(&server).health().await;
        assert!(health.reachable);
        assert!(!health.collections_present);
    }
}
