//! Disease pipelines: batch creation against stored symptoms, and exact symptom-set matching.

use crate::processing::batch::{BatchPolicy, Outcome, run_batches};
use crate::processing::types::{
    DiseaseBatchReport, DiseaseError, DiseaseInput, DiseaseMatch, DiseasesMatchReport,
    MAX_INGEST_BATCH_SIZE, PipelineError, validate_batch_size,
};
use crate::store::{DiseaseDocument, DocumentStore, UpsertReceipt};
use std::sync::Arc;

/// Resolve each disease's symptom names to stored ids and upsert it.
pub async fn create_diseases(
    store: Arc<dyn DocumentStore>,
    diseases: Vec<DiseaseInput>,
    batch_size: usize,
) -> Result<DiseaseBatchReport, PipelineError> {
    let batch_size = validate_batch_size(batch_size, MAX_INGEST_BATCH_SIZE)?;
    let submitted = diseases.len();

    let report = run_batches(diseases, batch_size, BatchPolicy::default(), |input| {
        let store = store.clone();
        async move { create_one(store.as_ref(), input).await }
    })
    .await;

    tracing::info!(
        submitted,
        succeeded = report.success_count(),
        failed = report.failed_count(),
        batches = report.batches,
        elapsed = report.elapsed_seconds,
        "Disease batch completed"
    );

    Ok(DiseaseBatchReport {
        success_count: report.success_count(),
        failed_count: report.failed_count(),
        errors: report
            .failures
            .into_iter()
            .map(|failure| DiseaseError {
                disease: Some(failure.label),
                error: failure.error,
            })
            .collect(),
        processing_time: report.elapsed_seconds,
    })
}

async fn create_one(store: &dyn DocumentStore, input: DiseaseInput) -> Outcome<UpsertReceipt> {
    let DiseaseInput {
        name,
        description,
        symptoms,
    } = input;
    let names: Vec<String> = symptoms.iter().map(|s| s.trim().to_string()).collect();

    let known = match store.find_symptom_ids(&names).await {
        Ok(known) => known,
        Err(error) => {
            return Outcome::failure(name, format!("Error fetching symptom IDs: {error}"));
        }
    };

    let missing: Vec<&str> = names
        .iter()
        .filter(|symptom| !known.contains_key(symptom.as_str()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        tracing::debug!(disease = %name, missing = ?missing, "Disease references unknown symptoms");
        return Outcome::failure(name, format!("Symptoms not found: {}", missing.join(", ")));
    }

    let symptom_ids = names
        .iter()
        .filter_map(|symptom| known.get(symptom).cloned())
        .collect();
    let result = store
        .upsert_disease(DiseaseDocument {
            name: name.clone(),
            description,
            symptom_ids,
            symptom_names: names,
        })
        .await;
    Outcome::from_result(name, result)
}

/// Diseases associated with every one of `symptom_ids`.
pub async fn find_diseases(
    store: &dyn DocumentStore,
    symptom_ids: Vec<String>,
) -> Result<DiseasesMatchReport, PipelineError> {
    if symptom_ids.is_empty() {
        return Err(PipelineError::EmptyInput("No symptoms provided"));
    }

    match store.find_diseases_with_all(&symptom_ids).await {
        Ok(records) => {
            let diseases: Vec<DiseaseMatch> = records
                .into_iter()
                .map(|record| DiseaseMatch {
                    name: record.name,
                    description: record.description,
                    id: record.id,
                })
                .collect();
            tracing::debug!(
                symptoms = symptom_ids.len(),
                matches = diseases.len(),
                "Disease match completed"
            );
            Ok(DiseasesMatchReport {
                count: diseases.len(),
                diseases,
                error: None,
            })
        }
        Err(error) => {
            tracing::warn!(error = %error, "Disease lookup failed");
            Ok(DiseasesMatchReport {
                diseases: Vec::new(),
                count: 0,
                error: Some(error.to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::test_support::{MemoryStore, RecordingEmbedder};

    fn disease(name: &str, symptoms: &[&str]) -> DiseaseInput {
        DiseaseInput {
            name: name.into(),
            description: format!("{name} description"),
            symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn seeded() -> (Arc<MemoryStore>, String, String) {
        let store = Arc::new(MemoryStore::default());
        let embedder = RecordingEmbedder::default();
        let fever = store.seed_symptom(&embedder, "fever", "2").await;
        let cough = store.seed_symptom(&embedder, "cough", "1").await;
        (store, fever, cough)
    }

    #[tokio::test]
    async fn creates_disease_with_ids_in_listed_order() {
        let (store, fever, cough) = seeded().await;
        let report = create_diseases(store.clone(), vec![disease("flu", &["cough", " fever "])], 10)
            .await
            .expect("report");

        assert_eq!(report.success_count, 1);
        let stored = store.disease("flu").await.expect("stored");
        assert_eq!(stored.symptom_ids, vec![cough, fever]);
        assert_eq!(stored.symptom_names, vec!["cough".to_string(), "fever".to_string()]);
    }

    #[tokio::test]
    async fn unknown_symptoms_fail_only_that_disease() {
        let (store, _, _) = seeded().await;
        let report = create_diseases(
            store.clone(),
            vec![
                disease("flu", &["fever", "cough"]),
                disease("mystery", &["fever", "glow", "hum"]),
            ],
            1,
        )
        .await
        .expect("report");

        assert_eq!(report.success_count, 1);
        assert_eq!(report.failed_count, 1);
        assert_eq!(
            report.errors,
            vec![DiseaseError {
                disease: Some("mystery".into()),
                error: "Symptoms not found: glow, hum".into()
            }]
        );
        assert!(store.disease("mystery").await.is_none());
    }

    #[tokio::test]
    async fn lookup_failure_is_reported_per_disease() {
        let (store, _, _) = seeded().await;
        store.fail_lookups();
        let report = create_diseases(store, vec![disease("flu", &["fever"])], 5)
            .await
            .expect("report");
        assert_eq!(report.failed_count, 1);
        assert!(report.errors[0].error.starts_with("Error fetching symptom IDs"));
    }

    #[tokio::test]
    async fn find_diseases_requires_all_ids() {
        let (store, fever, cough) = seeded().await;
        create_diseases(
            store.clone(),
            vec![disease("flu", &["fever", "cough"]), disease("cold", &["cough"])],
            10,
        )
        .await
        .expect("report");

        let both = find_diseases(store.as_ref(), vec![fever.clone(), cough.clone()])
            .await
            .expect("report");
        assert_eq!(both.count, 1);
        assert_eq!(both.diseases[0].name, "flu");

        let cough_only = find_diseases(store.as_ref(), vec![cough]).await.expect("report");
        assert_eq!(cough_only.count, 2);
    }

    #[tokio::test]
    async fn find_diseases_rejects_empty_input() {
        let store = MemoryStore::default();
        let error = find_diseases(&store, Vec::new()).await.expect_err("empty");
        assert_eq!(error.to_string(), "No symptoms provided");
    }

    #[tokio::test]
    async fn find_diseases_surfaces_store_errors_in_report() {
        let store = MemoryStore::default();
        store.fail_lookups();
        let report = find_diseases(&store, vec!["1".into()]).await.expect("report");
        assert_eq!(report.count, 0);
        assert!(report.error.is_some());
    }
}
