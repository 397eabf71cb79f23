//! Ingestion service coordinating the session-scoped pipeline.

use crate::{
    config::get_config,
    extract::{
        DimensionExtractor, TextExtractor, get_dimension_extractor, get_text_extractor,
    },
    metrics::{IngestMetrics, MetricsSnapshot},
    pipeline::{
        chunking::{chunk_text, determine_chunk_budget},
        merge, orchestrator,
        orchestrator::ProgressWindow,
        types::{Dimension, PipelineError},
    },
    progress::{ProgressStore, ResultState},
};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Reference progress windows for the pipeline stages.
const TEXT_EXTRACTION_END: u8 = 25;
const CHUNKING_END: u8 = 30;
const EXTRACTION_WINDOW: ProgressWindow = ProgressWindow { base: 30, span: 65 };
const MERGE_START: u8 = 95;

/// Coordinates the full ingestion pipeline for submitted documents.
///
/// The service owns long-lived handles to the extraction adapters, the
/// progress store, and the metrics registry. Each submission allocates a
/// session and spawns one independent background task that drives
/// extract-text, chunk, fan-out, merge, and completion, updating the store
/// at every stage. Construct the service once near process start and share
/// it through an `Arc`.
#[derive(Clone)]
pub struct IngestionService {
    text_extractor: Arc<dyn TextExtractor>,
    dimension_extractor: Arc<dyn DimensionExtractor>,
    store: Arc<ProgressStore>,
    metrics: Arc<IngestMetrics>,
}

/// Abstraction over the ingestion pipeline used by the HTTP surface.
#[async_trait]
pub trait IngestionApi: Send + Sync {
    /// Register a session for the document and start processing in the
    /// background. Returns immediately with the session identifier.
    async fn submit(&self, document: Vec<u8>) -> Uuid;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl IngestionService {
    /// Build a service wired to the deployment's extraction adapters.
    pub fn new(store: Arc<ProgressStore>) -> Self {
        Self::with_extractors(store, get_text_extractor(), get_dimension_extractor())
    }

    /// Build a service with explicit adapters. Primarily a test seam.
    pub fn with_extractors(
        store: Arc<ProgressStore>,
        text_extractor: Arc<dyn TextExtractor>,
        dimension_extractor: Arc<dyn DimensionExtractor>,
    ) -> Self {
        Self {
            text_extractor,
            dimension_extractor,
            store,
            metrics: Arc::new(IngestMetrics::new()),
        }
    }

    /// Register a session and spawn the background pipeline task.
    pub async fn submit(&self, document: Vec<u8>) -> Uuid {
        let session_id = self.store.create().await;
        self.metrics.record_submission();
        tracing::info!(session = %session_id, bytes = document.len(), "Accepted document");

        let service = self.clone();
        tokio::spawn(async move {
            service.run_pipeline(session_id, document).await;
        });

        session_id
    }

    /// Return the current ingestion metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Drive one session end to end, always leaving a terminal result.
    async fn run_pipeline(&self, session_id: Uuid, document: Vec<u8>) {
        self.store
            .update(session_id, 0, "Extracting document text")
            .await;

        let text = match self.text_extractor.extract_text(&document).await {
            Ok(text) => text,
            Err(error) => {
                return self.fail(session_id, PipelineError::from(error)).await;
            }
        };
        if text.trim().is_empty() {
            return self.fail(session_id, PipelineError::EmptyDocument).await;
        }

        self.store
            .update(session_id, TEXT_EXTRACTION_END, "Chunking extracted text")
            .await;

        let config = get_config();
        let budget = determine_chunk_budget(config.chunk_max_tokens, &config.extraction_model);
        let chunks = match chunk_text(&text, budget, &config.extraction_model) {
            Ok(chunks) => chunks,
            Err(error) => {
                return self.fail(session_id, PipelineError::from(error)).await;
            }
        };
        let chunk_count = chunks.len();
        tracing::debug!(
            session = %session_id,
            chunks = chunk_count,
            chunk_budget = budget,
            "Document chunked"
        );

        let total_units = chunk_count * Dimension::ALL.len();
        self.store
            .update(
                session_id,
                CHUNKING_END,
                format!("Extracting dimensions (0/{total_units} units)"),
            )
            .await;

        let aggregates = orchestrator::run_dimensions(
            Arc::clone(&self.dimension_extractor),
            Arc::new(chunks),
            config.extract_timeout,
            Arc::clone(&self.store),
            session_id,
            EXTRACTION_WINDOW,
        )
        .await;

        self.store
            .update(session_id, MERGE_START, "Merging dimension results")
            .await;

        let final_document = merge::finalize(&aggregates);
        let succeeded = aggregates
            .iter()
            .filter(|aggregate| aggregate.failed_chunks < chunk_count)
            .count();
        let message = format!(
            "Ingestion complete ({succeeded}/{} dimensions succeeded)",
            Dimension::ALL.len()
        );

        self.metrics
            .record_completion(chunk_count as u64, budget as u64);
        tracing::info!(
            session = %session_id,
            chunks = chunk_count,
            dimensions_succeeded = succeeded,
            "Session completed"
        );
        self.store
            .complete(session_id, ResultState::Success(final_document), message)
            .await;
    }

    /// Record a fatal pipeline error as the session's terminal result.
    ///
    /// Progress keeps whatever percent had been reached; only the message
    /// changes to carry the error.
    async fn fail(&self, session_id: Uuid, error: PipelineError) {
        let reason = error.to_string();
        tracing::warn!(session = %session_id, error = %reason, "Session failed");
        self.metrics.record_failure();
        self.store
            .complete(session_id, ResultState::Failure(reason.clone()), reason)
            .await;
    }
}

#[async_trait]
impl IngestionApi for IngestionService {
    async fn submit(&self, document: Vec<u8>) -> Uuid {
        IngestionService::submit(self, document).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        IngestionService::metrics_snapshot(self)
    }
}
