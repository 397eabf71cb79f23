//! Concurrent fan-out of extraction work across the four dimensions.
//!
//! One worker task per dimension, each walking its chunks sequentially; the
//! pool is therefore bounded at four regardless of chunk count. A failed or
//! timed-out (dimension, chunk) call contributes the neutral merge value and
//! is recorded against its dimension; the remaining work is unaffected.
//! Aggregation folds by chunk index, so the relative completion order of the
//! workers never changes the output.

use super::{decode, merge};
use super::types::{ChunkResult, Dimension, DimensionAggregate};
use crate::extract::DimensionExtractor;
use crate::progress::ProgressStore;
use futures_util::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Progress window allotted to a pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct ProgressWindow {
    /// Percent at which the stage begins.
    pub base: u8,
    /// Percentage points the stage spans.
    pub span: u8,
}

impl ProgressWindow {
    /// Percent after `completed` of `total` units, floored, never past the window.
    fn percent(self, completed: usize, total: usize) -> u8 {
        if total == 0 {
            return self.base.saturating_add(self.span);
        }
        let advance = completed * usize::from(self.span) / total;
        self.base.saturating_add(advance as u8)
    }
}

/// Run extraction for every (dimension, chunk) pair and fold the results.
///
/// Each extract call is bounded by `call_timeout`; a breach is treated
/// identically to an extraction failure. Progress is advanced in `window`
/// after every completed unit, counted across all dimensions. Returns one
/// aggregate per dimension in canonical order; a panicked worker degrades to
/// an all-failed aggregate rather than sinking the job.
pub async fn run_dimensions(
    extractor: Arc<dyn DimensionExtractor>,
    chunks: Arc<Vec<String>>,
    call_timeout: Duration,
    store: Arc<ProgressStore>,
    session_id: Uuid,
    window: ProgressWindow,
) -> Vec<DimensionAggregate> {
    let total_units = chunks.len() * Dimension::ALL.len();
    let completed_units = Arc::new(AtomicUsize::new(0));

    let workers = Dimension::ALL.map(|dimension| {
        let extractor = Arc::clone(&extractor);
        let chunks = Arc::clone(&chunks);
        let store = Arc::clone(&store);
        let completed_units = Arc::clone(&completed_units);

        tokio::spawn(async move {
            let mut results = Vec::with_capacity(chunks.len());
            for (chunk_index, chunk) in chunks.iter().enumerate() {
                let value = extract_unit(
                    extractor.as_ref(),
                    dimension,
                    chunk_index,
                    chunk,
                    call_timeout,
                )
                .await;
                results.push(ChunkResult {
                    dimension,
                    chunk_index,
                    value,
                });

                let done = completed_units.fetch_add(1, Ordering::SeqCst) + 1;
                store
                    .update(
                        session_id,
                        window.percent(done, total_units),
                        format!("Extracting dimensions ({done}/{total_units} units)"),
                    )
                    .await;
            }
            merge::fold_dimension(dimension, results)
        })
    });

    let joined = join_all(workers).await;
    Dimension::ALL
        .into_iter()
        .zip(joined)
        .map(|(dimension, outcome)| match outcome {
            Ok(aggregate) => aggregate,
            Err(join_error) => {
                tracing::error!(
                    %dimension,
                    error = %join_error,
                    "Dimension worker panicked; contributing neutral aggregate"
                );
                DimensionAggregate {
                    dimension,
                    value: merge::neutral_value(),
                    failed_chunks: chunks.len(),
                }
            }
        })
        .collect()
}

/// Execute one bounded extract call and decode its payload.
///
/// Timeout, extraction failure, and an unparseable payload all collapse to
/// `None`: the neutral contribution for the merge fold.
async fn extract_unit(
    extractor: &dyn DimensionExtractor,
    dimension: Dimension,
    chunk_index: usize,
    chunk: &str,
    call_timeout: Duration,
) -> Option<serde_json::Map<String, serde_json::Value>> {
    match tokio::time::timeout(call_timeout, extractor.extract(dimension, chunk)).await {
        Ok(Ok(raw)) => match decode::decode_partial(&raw) {
            Ok(partial) => Some(partial),
            Err(error) => {
                tracing::warn!(
                    %dimension,
                    chunk = chunk_index,
                    error = %error,
                    "Discarding unparseable chunk payload"
                );
                None
            }
        },
        Ok(Err(error)) => {
            tracing::warn!(
                %dimension,
                chunk = chunk_index,
                error = %error,
                "Extraction failed for chunk"
            );
            None
        }
        Err(_) => {
            tracing::warn!(
                %dimension,
                chunk = chunk_index,
                timeout = ?call_timeout,
                "Extraction timed out for chunk"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DimensionExtractError;
    use async_trait::async_trait;
    use serde_json::json;

    const WINDOW: ProgressWindow = ProgressWindow { base: 30, span: 65 };

    /// Emits `{"k": [chunk_index]}` for every dimension, parsing the index
    /// back out of the chunk text.
    struct IndexedExtractor;

    #[async_trait]
    impl DimensionExtractor for IndexedExtractor {
        async fn extract(
            &self,
            _dimension: Dimension,
            chunk: &str,
        ) -> Result<String, DimensionExtractError> {
            let index: usize = chunk.trim().parse().expect("test chunks are indices");
            Ok(json!({"k": [index]}).to_string())
        }
    }

    /// Fails every ontology call and succeeds elsewhere.
    struct OntologyFailsExtractor;

    #[async_trait]
    impl DimensionExtractor for OntologyFailsExtractor {
        async fn extract(
            &self,
            dimension: Dimension,
            chunk: &str,
        ) -> Result<String, DimensionExtractError> {
            if dimension == Dimension::Ontology {
                return Err(DimensionExtractError::ExtractionFailed(
                    "ontology backend down".into(),
                ));
            }
            Ok(json!({"seen": [chunk.trim()]}).to_string())
        }
    }

    /// Never returns; only the caller-supplied timeout ends the call.
    struct HangingExtractor;

    #[async_trait]
    impl DimensionExtractor for HangingExtractor {
        async fn extract(
            &self,
            _dimension: Dimension,
            _chunk: &str,
        ) -> Result<String, DimensionExtractError> {
            std::future::pending::<Result<String, DimensionExtractError>>().await
        }
    }

    fn chunks(count: usize) -> Arc<Vec<String>> {
        Arc::new((0..count).map(|i| i.to_string()).collect())
    }

    #[tokio::test]
    async fn merges_chunk_results_by_index_for_every_dimension() {
        let store = Arc::new(ProgressStore::new());
        let session = store.create().await;
        let aggregates = run_dimensions(
            Arc::new(IndexedExtractor),
            chunks(3),
            Duration::from_secs(5),
            Arc::clone(&store),
            session,
            WINDOW,
        )
        .await;

        assert_eq!(aggregates.len(), 4);
        for aggregate in &aggregates {
            assert_eq!(aggregate.value, json!({"k": [0, 1, 2]}));
            assert_eq!(aggregate.failed_chunks, 0);
        }

        let snapshot = store.snapshot(session).await.expect("session exists");
        assert_eq!(snapshot.percent, 95);
    }

    #[tokio::test]
    async fn failing_dimension_is_isolated() {
        let store = Arc::new(ProgressStore::new());
        let session = store.create().await;
        let aggregates = run_dimensions(
            Arc::new(OntologyFailsExtractor),
            chunks(2),
            Duration::from_secs(5),
            store,
            session,
            WINDOW,
        )
        .await;

        for aggregate in &aggregates {
            if aggregate.dimension == Dimension::Ontology {
                assert_eq!(aggregate.value, merge::neutral_value());
                assert_eq!(aggregate.failed_chunks, 2);
            } else {
                assert_eq!(aggregate.value, json!({"seen": ["0", "1"]}));
                assert_eq!(aggregate.failed_chunks, 0);
            }
        }
    }

    #[tokio::test]
    async fn timeouts_are_treated_as_failures() {
        let store = Arc::new(ProgressStore::new());
        let session = store.create().await;
        let aggregates = run_dimensions(
            Arc::new(HangingExtractor),
            chunks(1),
            Duration::from_millis(20),
            store,
            session,
            WINDOW,
        )
        .await;

        for aggregate in &aggregates {
            assert_eq!(aggregate.value, merge::neutral_value());
            assert_eq!(aggregate.failed_chunks, 1);
        }
    }

    #[tokio::test]
    async fn progress_lands_at_window_end() {
        let store = Arc::new(ProgressStore::new());
        let session = store.create().await;
        run_dimensions(
            Arc::new(IndexedExtractor),
            chunks(5),
            Duration::from_secs(5),
            Arc::clone(&store),
            session,
            WINDOW,
        )
        .await;

        let snapshot = store.snapshot(session).await.expect("session exists");
        assert_eq!(snapshot.percent, 95);
        assert!(snapshot.message.contains("/20 units"));
    }
}
