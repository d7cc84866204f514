//! HTTP client wrapper for interacting with Qdrant.

use crate::config::Config;
use crate::qdrant::payload::{point_id_value, stringify_point_id};
use crate::qdrant::types::{
    Distance, ListCollectionsResponse, QdrantError, QueryResponse, QueryResponseResult,
    ScoredPoint, ScrollResponse,
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};

const SCROLL_PAGE_SIZE: usize = 512;

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a new client from configuration.
    pub fn new(config: &Config) -> Result<Self, QdrantError> {
        let client = Client::builder()
            .user_agent("symptom-atlas/0.1")
            .timeout(config.request_timeout())
            .build()?;

        let base_url = normalize_base_url(&config.qdrant_url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %config
                .qdrant_api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: config.qdrant_api_key.clone(),
        })
    }

    /// Create a collection only when it is missing from Qdrant.
    pub async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
        vector_size: u64,
        distance: Distance,
    ) -> Result<(), QdrantError> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        tracing::debug!(
            collection = collection_name,
            vector_size,
            "Creating collection"
        );
        self.create_collection(collection_name, vector_size, distance)
            .await
    }

    /// Create or update a collection with the specified vector size.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
        distance: Distance,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": distance.as_str()
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection ensured/created");
        })
        .await
    }

    /// Retrieve the names of all collections present in Qdrant.
    pub async fn list_collections(&self) -> Result<Vec<String>, QdrantError> {
        let response = self.request(Method::GET, "collections").send().await?;

        if !response.status().is_success() {
            let error = unexpected_status(response).await;
            tracing::error!(error = %error, "Failed to list collections");
            return Err(error);
        }
        let payload: ListCollectionsResponse = response.json().await?;
        Ok(payload
            .result
            .collections
            .into_iter()
            .map(|collection| collection.name)
            .collect())
    }

    /// Ensure keyword payload indexes exist for the given fields.
    pub async fn ensure_payload_indexes(
        &self,
        collection_name: &str,
        fields: &[&str],
    ) -> Result<(), QdrantError> {
        for field in fields {
            let body = json!({
                "field_name": field,
                "field_schema": "keyword",
            });

            let response = self
                .request(Method::PUT, &format!("collections/{collection_name}/index"))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() {
                tracing::debug!(collection = collection_name, field, "Payload index ensured");
            } else if response.status() == StatusCode::CONFLICT {
                tracing::debug!(
                    collection = collection_name,
                    field,
                    "Payload index already exists"
                );
            } else {
                let error = unexpected_status(response).await;
                tracing::warn!(
                    collection = collection_name,
                    field,
                    error = %error,
                    "Failed to ensure payload index"
                );
            }
        }

        Ok(())
    }

    /// Write a single point, replacing any point with the same id.
    pub async fn upsert_point(
        &self,
        collection_name: &str,
        id: &str,
        vector: Vec<f32>,
        payload: Value,
    ) -> Result<(), QdrantError> {
        let point_id =
            point_id_value(id).ok_or_else(|| QdrantError::InvalidPointId(id.to_string()))?;
        let body = json!({
            "points": [
                { "id": point_id, "vector": vector, "payload": payload }
            ]
        });

        let response = self
            .request(
                Method::PUT,
                &format!("collections/{collection_name}/points"),
            )
            .query(&[("wait", true)])
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, id, "Point upserted");
        })
        .await
    }

    /// Perform a similarity search against a collection, returning scored payloads.
    pub async fn search_points(
        &self,
        collection_name: &str,
        vector: Vec<f32>,
        filter: Option<Value>,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let mut body = Map::new();
        body.insert("query".into(), json!(vector));
        body.insert("limit".into(), Value::from(limit.max(1)));
        body.insert("with_payload".into(), Value::Bool(true));

        if let Some(threshold) = score_threshold {
            body.insert("score_threshold".into(), Value::from(threshold));
        }

        if let Some(filter_value) = filter {
            body.insert("filter".into(), filter_value);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )
            .json(&Value::Object(body))
            .send()
            .await?;

        if !response.status().is_success() {
            let error = unexpected_status(response).await;
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        let results = points
            .into_iter()
            .map(|point| ScoredPoint {
                id: stringify_point_id(point.id),
                score: point.score,
                payload: point.payload,
            })
            .collect();

        Ok(results)
    }

    /// Scroll payloads matching `filter` and return them with their point identifiers.
    ///
    /// `max_points` stops pagination once enough points were collected.
    pub async fn scroll_points(
        &self,
        collection: &str,
        with_payload: Value,
        filter: Option<Value>,
        max_points: Option<usize>,
    ) -> Result<Vec<(String, Map<String, Value>)>, QdrantError> {
        let mut offset: Option<Value> = None;
        let mut results = Vec::new();
        let filter_body = filter.unwrap_or_else(|| json!({ "must": [] }));
        let page_size = max_points.map_or(SCROLL_PAGE_SIZE, |max| max.clamp(1, SCROLL_PAGE_SIZE));

        loop {
            let mut body = Map::new();
            body.insert("with_payload".into(), with_payload.clone());
            body.insert("with_vector".into(), Value::Bool(false));
            body.insert("limit".into(), Value::from(page_size));
            body.insert("filter".into(), filter_body.clone());
            if let Some(next) = offset.take() {
                body.insert("offset".into(), next);
            }

            let response = self
                .request(
                    Method::POST,
                    &format!("collections/{collection}/points/scroll"),
                )
                .json(&Value::Object(body))
                .send()
                .await?;

            if !response.status().is_success() {
                let error = unexpected_status(response).await;
                tracing::error!(collection, error = %error, "Failed to scroll points");
                return Err(error);
            }

            let ScrollResponse { result } = response.json().await?;
            // Qdrant sends `"payload": null` when payloads are not requested.
            for point in result.points {
                if let Some(id) = point.id {
                    results.push((stringify_point_id(id), point.payload.unwrap_or_default()));
                }
            }

            if let Some(max) = max_points
                && results.len() >= max
            {
                results.truncate(max);
                break;
            }

            match result.next_page_offset {
                Some(Value::Null) | None => break,
                Some(next) => offset = Some(next),
            }
        }

        Ok(results)
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => {
                let error = unexpected_status(response).await;
                tracing::error!(
                    collection = collection_name,
                    error = %error,
                    "Collection existence check failed"
                );
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let error = unexpected_status(response).await;
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

async fn unexpected_status(response: reqwest::Response) -> QdrantError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    QdrantError::UnexpectedStatus { status, body }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use httpmock::{
        Method::{POST, PUT},
        MockServer,
    };

    pub(crate) fn service_for(server: &MockServer) -> QdrantService {
        QdrantService {
            client: Client::builder()
                .user_agent("symptom-atlas-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            api_key: None,
        }
    }

    #[tokio::test]
    async fn search_points_emits_expected_request() {
        let server = MockServer::start_async().await;

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/symptoms/points/query")
                    .json_body_partial(r#"{"limit":1,"with_payload":true}"#);
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            {
                                "id": "3f0e2a8e-2d0c-4b8e-9c2a-1a2b3c4d5e6f",
                                "score": 0.91,
                                "payload": { "symptom": "fever", "severity": "2" }
                            }
                        ]
                    }
                }));
            })
            .await;

        let results = service_for(&server)
            .search_points("symptoms", vec![0.1, 0.2], None, 1, None)
            .await
            .expect("search request");

        mock.assert();
        assert_eq!(results.len(), 1);
        let hit = &results[0];
        assert_eq!(hit.id, "3f0e2a8e-2d0c-4b8e-9c2a-1a2b3c4d5e6f");
        assert!((hit.score - 0.91).abs() < f32::EPSILON);
        let payload = hit.payload.as_ref().expect("payload");
        assert_eq!(payload["symptom"], Value::String("fever".into()));
    }

    #[tokio::test]
    async fn upsert_point_encodes_numeric_ids_and_waits() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/symptoms/points")
                    .query_param("wait", "true")
                    .body_contains("\"id\":17");
                then.status(200).json_body(json!({ "status": "ok", "result": {} }));
            })
            .await;

        service_for(&server)
            .upsert_point("symptoms", "17", vec![1.0], json!({ "symptom": "fever" }))
            .await
            .expect("upsert");
        mock.assert();
    }

    #[tokio::test]
    async fn upsert_point_rejects_free_form_ids() {
        let server = MockServer::start_async().await;
        let error = service_for(&server)
            .upsert_point("symptoms", "fever", vec![1.0], json!({}))
            .await
            .expect_err("invalid id");
        assert!(matches!(error, QdrantError::InvalidPointId(_)));
    }

    #[tokio::test]
    async fn scroll_points_follows_offsets_until_exhausted() {
        let server = MockServer::start_async().await;
        let second = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/diseases/points/scroll")
                    .body_contains("\"offset\"");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [ { "id": 2, "payload": { "name": "cold" } } ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;
        let first = server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/diseases/points/scroll");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [ { "id": 1, "payload": { "name": "flu" } } ],
                        "next_page_offset": 2
                    }
                }));
            })
            .await;

        let points = service_for(&server)
            .scroll_points("diseases", json!(true), None, None)
            .await
            .expect("scroll");

        first.assert();
        second.assert();
        let ids: Vec<&str> = points.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn scroll_points_keeps_points_without_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/symptoms/points/scroll")
                    .body_contains("\"with_payload\":false");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [ { "id": 7, "payload": null }, { "payload": {} } ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;

        let points = service_for(&server)
            .scroll_points("symptoms", json!(false), None, Some(1))
            .await
            .expect("scroll");

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].0, "7");
        assert!(points[0].1.is_empty());
    }

    #[tokio::test]
    async fn unexpected_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/symptoms/points/query");
                then.status(503).body("unavailable");
            })
            .await;

        let error = service_for(&server)
            .search_points("symptoms", vec![0.0], None, 1, None)
            .await
            .expect_err("503");
        let unavailable = StatusCode::SERVICE_UNAVAILABLE;
        assert!(matches!(
            error,
            QdrantError::UnexpectedStatus { status, .. } if status == unavailable
        ));
    }
}
