//! HTTP surface for graphprep.
//!
//! - `POST /v1/dataprep/ingest_file` – Run the ingestion pipeline for one document on disk.
//!   Returns `{success, message, graphName?, chunkCount?, chunkIndex?}`; failures answer 400
//!   with the same shape.
//! - `POST /v1/dataprep/retract_file` – Remove everything derived from a `fileId`. Returns
//!   `{status, success, message, deletedChunks}`.
//! - `GET /metrics` – Ingestion and retraction counters.
//! - `GET /health` – Liveness plus the active labelling and guardrail settings.

use crate::metrics::MetricsSnapshot;
use crate::processing::{HealthSnapshot, IngestRequest, IngestionApi, RetractionRequest};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;

/// Build the HTTP router exposing the ingestion API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: IngestionApi + 'static,
{
    Router::new()
        .route("/v1/dataprep/ingest_file", post(ingest_file::<S>))
        .route("/v1/dataprep/retract_file", post(retract_file::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/health", get(get_health::<S>))
        .with_state(service)
}

async fn ingest_file<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<IngestRequest>,
) -> Response
where
    S: IngestionApi,
{
    let file_id = request.file_id.clone();
    let response = service.ingest_file(request).await;
    tracing::info!(
        file_id = %file_id,
        success = response.success,
        chunks = ?response.chunk_count,
        "Ingest request completed"
    );
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(response)).into_response()
}

async fn retract_file<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<RetractionRequest>,
) -> Response
where
    S: IngestionApi,
{
    let response = service.retract_file(request).await;
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response)).into_response()
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: IngestionApi,
{
    Json(service.metrics_snapshot())
}

async fn get_health<S>(State(service): State<Arc<S>>) -> Json<HealthSnapshot>
where
    S: IngestionApi,
{
    Json(service.health())
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        HealthSnapshot, IngestRequest, IngestionApi, IngestionResponse, RetractionRequest,
        RetractionResponse,
    };
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct StubIngestionService {
        ingests: Mutex<Vec<IngestRequest>>,
        retractions: Mutex<Vec<RetractionRequest>>,
    }

    #[async_trait]
    impl IngestionApi for StubIngestionService {
        async fn ingest_file(&self, request: IngestRequest) -> IngestionResponse {
            let blocked = request.file_id == "unsafe";
            self.ingests.lock().await.push(request);
            if blocked {
                IngestionResponse {
                    success: false,
                    message: "Harmful content detected at chunk 1".into(),
                    graph_name: None,
                    chunk_count: None,
                    chunk_index: Some(1),
                }
            } else {
                IngestionResponse {
                    success: true,
                    message: "File ingested with 3 chunks.".into(),
                    graph_name: Some("GRAPH_TEST".into()),
                    chunk_count: Some(3),
                    chunk_index: None,
                }
            }
        }

        async fn retract_file(&self, request: RetractionRequest) -> RetractionResponse {
            let file_id = request.file_id.clone();
            self.retractions.lock().await.push(request);
            RetractionResponse::succeeded(&file_id, vec!["GRAPH_TEST_SOURCE/abc".into()])
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_ingested: 4,
                ..MetricsSnapshot::default()
            }
        }

        fn health(&self) -> HealthSnapshot {
            HealthSnapshot {
                status: "ok",
                default_graph: "GRAPH_TEST".into(),
                labelling_strategy: "bm25",
                guardrail_enabled: true,
                extraction_enabled: false,
            }
        }
    }

    async fn call(
        service: Arc<StubIngestionService>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let body = body.map_or_else(Body::empty, |value| Body::from(value.to_string()));
        let response = create_router(service)
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(body)
                    .expect("request"),
            )
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn ingest_route_parses_camel_case_request() {
        let service = Arc::new(StubIngestionService::default());
        let payload = json!({
            "fileId": "doc-1",
            "filePath": "/data/doc-1.pdf",
            "chunkSize": 800,
            "processTable": true,
            "graphName": "KB",
            "includeChunks": false
        });

        let (status, body) = call(
            service.clone(),
            Method::POST,
            "/v1/dataprep/ingest_file",
            Some(payload),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["chunkCount"], json!(3));

        let ingests = service.ingests.lock().await;
        assert_eq!(ingests.len(), 1);
        assert_eq!(ingests[0].chunk_size, 800);
        assert_eq!(ingests[0].chunk_overlap, 100);
        assert!(ingests[0].process_table);
        assert_eq!(ingests[0].graph_name.as_deref(), Some("KB"));
        assert_eq!(ingests[0].include_chunks, Some(false));
    }

    #[tokio::test]
    async fn failed_ingest_returns_structured_body() {
        let service = Arc::new(StubIngestionService::default());
        let (status, body) = call(
            service,
            Method::POST,
            "/v1/dataprep/ingest_file",
            Some(json!({"fileId": "unsafe", "filePath": "/data/x.txt"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["chunkIndex"], json!(1));
    }

    #[tokio::test]
    async fn retract_route_returns_deleted_chunks() {
        let service = Arc::new(StubIngestionService::default());
        let (status, body) = call(
            service.clone(),
            Method::POST,
            "/v1/dataprep/retract_file",
            Some(json!({"fileId": "doc-1"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!(200));
        assert_eq!(body["deletedChunks"], json!(["GRAPH_TEST_SOURCE/abc"]));
        assert_eq!(
            body["message"],
            json!("Data retraction succeeded for file_id=doc-1")
        );
        let retractions = service.retractions.lock().await;
        assert!(retractions[0].graph_name.is_none());
    }

    #[tokio::test]
    async fn metrics_and_health_are_exposed() {
        let service = Arc::new(StubIngestionService::default());
        let (status, metrics) = call(service.clone(), Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(metrics["documents_ingested"], json!(4));

        let (status, health) = call(service, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], json!("ok"));
        assert_eq!(health["guardrailEnabled"], json!(true));
    }
}
