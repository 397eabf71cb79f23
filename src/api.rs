//! HTTP surface for the guideline ingestion service.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /ingest` – Submit one document; a session is allocated and processing
//!   starts in the background. Returns `{ "session_id": "<uuid>" }` immediately.
//! - `GET /progress/{session_id}` – Server-sent events stream of
//!   `{percent, message}` updates, de-duplicated by value.
//! - `GET /result/{session_id}` – Terminal result with consume-and-delete
//!   semantics, or a "still processing" indicator.
//! - `GET /metrics` – Observe ingestion counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! The pipeline is agnostic to caller identity; authorization is a pre-step
//! outside this surface.

use crate::pipeline::IngestionApi;
use crate::progress::{FetchOutcome, ProgressStore, ResultState};
use crate::stream::{StreamSettings, progress_sse};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Shared state handed to every handler.
pub struct AppState<S> {
    service: Arc<S>,
    store: Arc<ProgressStore>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            store: Arc::clone(&self.store),
        }
    }
}

/// Build the HTTP router exposing the ingestion API surface.
pub fn create_router<S>(service: Arc<S>, store: Arc<ProgressStore>) -> Router
where
    S: IngestionApi + 'static,
{
    Router::new()
        .route("/ingest", post(ingest_document::<S>))
        .route("/progress/:session_id", get(progress_stream::<S>))
        .route("/result/:session_id", get(get_result::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(AppState { service, store })
}

/// Request body for the `POST /ingest` endpoint.
#[derive(Deserialize)]
struct IngestRequest {
    /// Raw document contents to process.
    content: String,
    /// Optional original filename for traceability.
    #[serde(default)]
    filename: Option<String>,
}

/// Success response for the `POST /ingest` endpoint.
#[derive(Serialize)]
struct IngestResponse {
    /// Identifier for polling progress and retrieving the result.
    session_id: String,
}

/// Submit a document and start a background ingestion session.
async fn ingest_document<S>(
    State(state): State<AppState<S>>,
    Json(request): Json<IngestRequest>,
) -> Json<IngestResponse>
where
    S: IngestionApi,
{
    let IngestRequest { content, filename } = request;
    let session_id = state.service.submit(content.into_bytes()).await;
    tracing::info!(
        session = %session_id,
        filename = filename.as_deref().unwrap_or("<unnamed>"),
        "Ingestion session started"
    );
    Json(IngestResponse {
        session_id: session_id.to_string(),
    })
}

/// Stream a session's progress as server-sent events.
async fn progress_stream<S>(
    State(state): State<AppState<S>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: IngestionApi,
{
    match Uuid::parse_str(&session_id) {
        Ok(session_id) => {
            progress_sse(state.store, session_id, StreamSettings::from_config()).into_response()
        }
        Err(_) => not_found_response(),
    }
}

/// Retrieve the terminal result for a session (consume-and-delete).
async fn get_result<S>(
    State(state): State<AppState<S>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: IngestionApi,
{
    let Ok(session_id) = Uuid::parse_str(&session_id) else {
        return not_found_response();
    };

    match state.store.fetch(session_id).await {
        FetchOutcome::Ready(ResultState::Success(document)) => (
            StatusCode::OK,
            Json(json!({ "status": "completed", "result": document })),
        )
            .into_response(),
        FetchOutcome::Ready(ResultState::Failure(reason)) => (
            StatusCode::OK,
            Json(json!({ "status": "failed", "reason": reason })),
        )
            .into_response(),
        FetchOutcome::Pending { percent, message } => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "processing", "percent": percent, "message": message })),
        )
            .into_response(),
        FetchOutcome::NotFound => not_found_response(),
    }
}

fn not_found_response() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": "not_found" })),
    )
        .into_response()
}

/// Return a concise metrics snapshot with session and chunk counters.
async fn get_metrics<S>(State(state): State<AppState<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: IngestionApi,
{
    Json(state.service.metrics_snapshot())
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

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "ingest",
                method: "POST",
                path: "/ingest",
                description: "Submit a document for ingestion. Returns { \"session_id\": string } immediately; processing runs in the background.",
                request_example: Some(json!({
                    "content": "Guideline document contents",
                    "filename": "guideline.txt"
                })),
            },
            CommandDescriptor {
                name: "progress",
                method: "GET",
                path: "/progress/{session_id}",
                description: "Server-sent events stream of { percent, message } progress updates for a session.",
                request_example: None,
            },
            CommandDescriptor {
                name: "result",
                method: "GET",
                path: "/result/{session_id}",
                description: "Fetch the terminal result for a session. Consume-and-delete: the first successful fetch removes the session.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::metrics::MetricsSnapshot;
    use crate::pipeline::IngestionApi;
    use crate::progress::{ProgressStore, ResultState};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn commands_catalog_exposes_ingest_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let ingest = commands
            .iter()
            .find(|cmd| cmd.name == "ingest")
            .expect("ingest command present");

        assert_eq!(ingest.method, "POST");
        assert_eq!(ingest.path, "/ingest");
        assert!(ingest.description.to_lowercase().contains("session"));

        // ensure catalog exposes multiple commands for host discovery
        assert!(commands.len() >= 4);
    }

    #[tokio::test]
    async fn ingest_route_returns_session_id() {
        let session_id = Uuid::new_v4();
        let service = Arc::new(StubIngestionService::new(session_id));
        let store = Arc::new(ProgressStore::new());
        let app = create_router(service.clone(), store);

        let payload = json!({
            "content": "Document body",
            "filename": "guideline.txt"
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/ingest")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let body: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body["session_id"], session_id.to_string());

        let documents = service.recorded_documents().await;
        assert_eq!(documents, vec![b"Document body".to_vec()]);
    }

    #[tokio::test]
    async fn result_route_consumes_exactly_once() {
        let service = Arc::new(StubIngestionService::new(Uuid::new_v4()));
        let store = Arc::new(ProgressStore::new());
        let session = store.create().await;
        store
            .complete(
                session,
                ResultState::Success(json!({"knowledge": {"rules": {}}})),
                "done",
            )
            .await;
        let app = create_router(service, store);

        let first = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/result/{session}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(first.status(), StatusCode::OK);
        let body = to_bytes(first.into_body(), usize::MAX).await.expect("body");
        let body: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(body["status"], "completed");
        assert!(body["result"]["knowledge"].is_object());

        let second = app
            .oneshot(
                Request::builder()
                    .uri(format!("/result/{session}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(second.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn result_route_reports_processing_sessions() {
        let service = Arc::new(StubIngestionService::new(Uuid::new_v4()));
        let store = Arc::new(ProgressStore::new());
        let session = store.create().await;
        store.update(session, 30, "Extracting dimensions").await;
        let app = create_router(service, store);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/result/{session}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(body["status"], "processing");
        assert_eq!(body["percent"], 30);
    }

    #[tokio::test]
    async fn result_route_rejects_unknown_and_malformed_ids() {
        let service = Arc::new(StubIngestionService::new(Uuid::new_v4()));
        let store = Arc::new(ProgressStore::new());
        let app = create_router(service, store);

        for path in [format!("/result/{}", Uuid::new_v4()), "/result/not-a-uuid".to_string()] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(path).body(Body::empty()).expect("request"))
                .await
                .expect("router response");
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn metrics_route_returns_counters() {
        let service = Arc::new(StubIngestionService::new(Uuid::new_v4()));
        let store = Arc::new(ProgressStore::new());
        let app = create_router(service, store);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(body["sessions_started"], 7);
    }

    struct StubIngestionService {
        session_id: Uuid,
        documents: Mutex<Vec<Vec<u8>>>,
    }

    impl StubIngestionService {
        fn new(session_id: Uuid) -> Self {
            Self {
                session_id,
                documents: Mutex::new(Vec::new()),
            }
        }

        async fn recorded_documents(&self) -> Vec<Vec<u8>> {
            self.documents.lock().await.clone()
        }
    }

    #[async_trait]
    impl IngestionApi for StubIngestionService {
        async fn submit(&self, document: Vec<u8>) -> Uuid {
            self.documents.lock().await.push(document);
            self.session_id
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                sessions_started: 7,
                sessions_completed: 5,
                sessions_failed: 1,
                chunks_processed: 40,
                last_chunk_budget: Some(512),
            }
        }
    }
}
