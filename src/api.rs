//! HTTP surface for Symptom Atlas.
//!
//! This module exposes an Axum router over [`ProcessingApi`]:
//!
//! - `POST /api/symptoms/symptoms/vectorize` – Embed and store symptoms in batches.
//! - `POST /api/diseases/batch` – Store diseases after resolving their symptom names to ids.
//! - `POST /api/diseases/find-diseases` – Diseases associated with every given symptom id.
//! - `GET /api/symptoms/search_symptom/{symptom}` – Closest stored symptom for one query.
//! - `POST /api/symptoms/search_symptoms` – Closest stored symptom for up to 100 queries.
//! - `POST /api/convert_notes_to_symptoms` – Extract symptoms from notes and search each one.
//! - `GET /api/metrics`, `GET /api/health`, `GET /api/commands` – Diagnostics and discovery.
//!
//! Validation failures, including malformed JSON, answer `400` with `{"error": "..."}`.

use crate::processing::{
    DiseaseInput, PipelineError, ProcessingApi, SymptomInput,
    types::{DEFAULT_INGEST_BATCH_SIZE, DEFAULT_SEARCH_BATCH_SIZE},
};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router exposing the symptom and disease API.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: ProcessingApi + 'static,
{
    Router::new()
        .route(
            "/api/symptoms/symptoms/vectorize",
            post(vectorize_symptoms::<S>),
        )
        .route("/api/diseases/batch", post(create_diseases::<S>))
        .route("/api/diseases/find-diseases", post(find_diseases::<S>))
        .route(
            "/api/symptoms/search_symptom/:symptom",
            get(search_symptom::<S>),
        )
        .route("/api/symptoms/search_symptoms", post(search_symptoms::<S>))
        .route("/api/convert_notes_to_symptoms", post(convert_notes::<S>))
        .route("/api/metrics", get(get_metrics::<S>))
        .route("/api/health", get(get_health::<S>))
        .route("/api/commands", get(get_commands))
        .with_state(service)
}

/// Request body for symptom vectorization.
#[derive(Deserialize)]
struct VectorizeRequest {
    symptoms: Vec<SymptomInput>,
    #[serde(default = "default_ingest_batch_size")]
    batch_size: usize,
}

/// Request body for disease creation.
#[derive(Deserialize)]
struct DiseaseBatchRequest {
    diseases: Vec<DiseaseInput>,
    #[serde(default = "default_ingest_batch_size")]
    batch_size: usize,
}

/// Request body for multi-symptom search.
#[derive(Deserialize)]
struct SearchSymptomsRequest {
    symptoms: Vec<String>,
    #[serde(default = "default_search_batch_size")]
    batch_size: usize,
}

#[derive(Deserialize)]
struct NotesRequest {
    notes: String,
}

fn default_ingest_batch_size() -> usize {
    DEFAULT_INGEST_BATCH_SIZE
}

fn default_search_batch_size() -> usize {
    DEFAULT_SEARCH_BATCH_SIZE
}

async fn vectorize_symptoms<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<VectorizeRequest>, JsonRejection>,
) -> Result<Response, AppError>
where
    S: ProcessingApi,
{
    let Json(request) = payload?;
    let report = service
        .vectorize_symptoms(request.symptoms, request.batch_size)
        .await?;
    Ok(Json(report).into_response())
}

async fn create_diseases<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<DiseaseBatchRequest>, JsonRejection>,
) -> Result<Response, AppError>
where
    S: ProcessingApi,
{
    let Json(request) = payload?;
    let report = service
        .create_diseases(request.diseases, request.batch_size)
        .await?;
    Ok(Json(report).into_response())
}

/// Match diseases against a bare JSON array of symptom ids.
async fn find_diseases<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> Result<Response, AppError>
where
    S: ProcessingApi,
{
    let Json(symptom_ids) = payload?;
    let report = service.find_diseases(symptom_ids).await?;
    Ok(Json(report).into_response())
}

async fn search_symptom<S>(
    State(service): State<Arc<S>>,
    Path(symptom): Path<String>,
) -> Response
where
    S: ProcessingApi,
{
    Json(service.search_symptom(symptom).await).into_response()
}

async fn search_symptoms<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<SearchSymptomsRequest>, JsonRejection>,
) -> Result<Response, AppError>
where
    S: ProcessingApi,
{
    let Json(request) = payload?;
    let report = service
        .search_symptoms(request.symptoms, request.batch_size)
        .await;
    Ok(Json(report).into_response())
}

async fn convert_notes<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<NotesRequest>, JsonRejection>,
) -> Result<Response, AppError>
where
    S: ProcessingApi,
{
    let Json(request) = payload?;
    let report = service.convert_notes(request.notes).await;
    tracing::info!(
        processed = report.processed_count,
        failed = report.error.is_some(),
        "Notes conversion completed"
    );
    Ok(Json(report).into_response())
}

/// Return the service counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Response
where
    S: ProcessingApi,
{
    Json(service.metrics_snapshot()).into_response()
}

/// Report store reachability; `503` when the backend cannot be reached.
async fn get_health<S>(State(service): State<Arc<S>>) -> Response
where
    S: ProcessingApi,
{
    let health = service.health().await;
    let status = if health.reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health)).into_response()
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /api/commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery by clients and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "vectorize_symptoms",
                method: "POST",
                path: "/api/symptoms/symptoms/vectorize",
                description: "Embed symptoms and store them keyed by symptom text. Returns \
                              success/failure counts, per-symptom errors, and processing_time \
                              in seconds.",
                request_example: Some(json!({
                    "symptoms": [{ "symptom": "fever", "severity": "2" }],
                    "batch_size": DEFAULT_INGEST_BATCH_SIZE
                })),
            },
            CommandDescriptor {
                name: "create_diseases",
                method: "POST",
                path: "/api/diseases/batch",
                description: "Store diseases whose symptoms are already vectorized. A disease \
                              naming an unknown symptom fails without being written.",
                request_example: Some(json!({
                    "diseases": [{
                        "name": "influenza",
                        "description": "Viral respiratory infection",
                        "symptoms": ["fever", "cough"]
                    }],
                    "batch_size": DEFAULT_INGEST_BATCH_SIZE
                })),
            },
            CommandDescriptor {
                name: "find_diseases",
                method: "POST",
                path: "/api/diseases/find-diseases",
                description: "Return diseases associated with every listed symptom id.",
                request_example: Some(json!(["symptom-id-1", "symptom-id-2"])),
            },
            CommandDescriptor {
                name: "search_symptom",
                method: "GET",
                path: "/api/symptoms/search_symptom/{symptom}",
                description: "Return the closest stored symptom with its severity, id, and \
                              similarity score.",
                request_example: None,
            },
            CommandDescriptor {
                name: "search_symptoms",
                method: "POST",
                path: "/api/symptoms/search_symptoms",
                description: "Search up to 100 symptoms in paced batches of at most 20.",
                request_example: Some(json!({
                    "symptoms": ["fever", "headache"],
                    "batch_size": DEFAULT_SEARCH_BATCH_SIZE
                })),
            },
            CommandDescriptor {
                name: "convert_notes_to_symptoms",
                method: "POST",
                path: "/api/convert_notes_to_symptoms",
                description: "Extract symptoms from free-text medical notes and match each one \
                              against stored symptoms.",
                request_example: Some(json!({
                    "notes": "Patient presents with high fever and a dry cough."
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/api/metrics",
                description: "Return request counters useful for observability dashboards.",
                request_example: None,
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/api/health",
                description: "Report whether Qdrant is reachable and both collections exist.",
                request_example: None,
            },
        ],
    })
}

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        if status.is_server_error() {
            tracing::error!(error = %message, "Request failed");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        let message = inner.to_string();
        match inner {
            PipelineError::EmptyInput(_)
            | PipelineError::TooManyQueries { .. }
            | PipelineError::InvalidBatchSize { .. } => Self::BadRequest(message),
            _ => Self::Internal(message),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
