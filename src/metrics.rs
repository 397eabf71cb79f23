use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion activity.
#[derive(Default)]
pub struct IngestMetrics {
    sessions_started: AtomicU64,
    sessions_completed: AtomicU64,
    sessions_failed: AtomicU64,
    chunks_processed: AtomicU64,
    last_chunk_budget: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly submitted session.
    pub fn record_submission(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful session with its chunk count and effective token budget.
    pub fn record_completion(&self, chunk_count: u64, chunk_budget: u64) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
        self.chunks_processed
            .fetch_add(chunk_count, Ordering::Relaxed);
        self.last_chunk_budget.store(chunk_budget, Ordering::Relaxed);
    }

    /// Record a session that terminated with a fatal error.
    pub fn record_failure(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let budget = self.last_chunk_budget.load(Ordering::Relaxed);
        MetricsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            last_chunk_budget: (budget > 0).then_some(budget),
        }
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of sessions submitted since startup.
    pub sessions_started: u64,
    /// Number of sessions that reached a successful terminal result.
    pub sessions_completed: u64,
    /// Number of sessions that terminated with a fatal error.
    pub sessions_failed: u64,
    /// Total chunk count processed across all completed sessions.
    pub chunks_processed: u64,
    /// Token budget used by the most recent completed session, if any.
    pub last_chunk_budget: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_sessions_and_chunks() {
        let metrics = IngestMetrics::new();
        metrics.record_submission();
        metrics.record_submission();
        metrics.record_completion(3, 512);
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sessions_started, 2);
        assert_eq!(snapshot.sessions_completed, 1);
        assert_eq!(snapshot.sessions_failed, 1);
        assert_eq!(snapshot.chunks_processed, 3);
        assert_eq!(snapshot.last_chunk_budget, Some(512));
    }

    #[test]
    fn empty_snapshot_hides_budget() {
        let metrics = IngestMetrics::new();
        assert_eq!(metrics.snapshot().last_chunk_budget, None);
    }
}
