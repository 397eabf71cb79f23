//! Session-keyed progress store shared by the pipeline and the stream server.
//!
//! The store is the only state shared between a session's background job and
//! its progress stream. All mutation happens under one lock per operation;
//! no lock is ever held across an await of an external call. Percent is
//! clamped to `[0, 100]` and never regresses within a session, regardless of
//! interleaving.

use serde_json::Value;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Current progress of a session as observed by readers.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// Completion percentage, 0 through 100, monotonically non-decreasing.
    pub percent: u8,
    /// Human-readable status message for the current stage.
    pub message: String,
    /// Whether a terminal result has been recorded for the session.
    pub terminal: bool,
    /// When the progress state last changed.
    pub updated_at: OffsetDateTime,
}

/// Terminal outcome of a session. Created once, immutable, consumed once.
#[derive(Debug, Clone)]
pub enum ResultState {
    /// Pipeline completed and produced a final document.
    Success(Value),
    /// Pipeline aborted with a fatal error.
    Failure(String),
}

/// Outcome of a consume-and-delete fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Terminal result; the session has been removed from the store.
    Ready(ResultState),
    /// Session exists but has not reached a terminal state.
    Pending {
        /// Percent at the time of the fetch.
        percent: u8,
        /// Status message at the time of the fetch.
        message: String,
    },
    /// Unknown or already-consumed session identifier.
    NotFound,
}

#[derive(Debug)]
struct SessionEntry {
    percent: u8,
    message: String,
    updated_at: OffsetDateTime,
    result: Option<ResultState>,
}

/// Process-wide store of per-session progress and terminal results.
#[derive(Debug, Default)]
pub struct ProgressStore {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl ProgressStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new session starting at zero percent.
    pub async fn create(&self) -> Uuid {
        let session_id = Uuid::new_v4();
        let entry = SessionEntry {
            percent: 0,
            message: "Queued for processing".to_string(),
            updated_at: OffsetDateTime::now_utc(),
            result: None,
        };
        self.sessions.write().await.insert(session_id, entry);
        tracing::debug!(session = %session_id, "Registered ingestion session");
        session_id
    }

    /// Overwrite the session's progress.
    ///
    /// Percent is clamped to `[0, 100]` and never allowed to regress.
    /// Unknown sessions and sessions that already hold a terminal result are
    /// a logged no-op.
    pub async fn update(&self, session_id: Uuid, percent: u8, message: impl Into<String>) {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(entry) if entry.result.is_none() => {
                entry.percent = percent.min(100).max(entry.percent);
                entry.message = message.into();
                entry.updated_at = OffsetDateTime::now_utc();
            }
            Some(_) => {
                tracing::debug!(session = %session_id, "Ignoring update after terminal result");
            }
            None => {
                tracing::debug!(session = %session_id, "Ignoring update for unknown session");
            }
        }
    }

    /// Record the terminal result for a session.
    ///
    /// Success implies `percent = 100`; failure keeps the last reached
    /// percent so readers see where the pipeline stopped. The first terminal
    /// result wins; later calls are a logged no-op.
    pub async fn complete(&self, session_id: Uuid, result: ResultState, message: impl Into<String>) {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(&session_id) else {
            tracing::debug!(session = %session_id, "Ignoring completion for unknown session");
            return;
        };
        if entry.result.is_some() {
            tracing::debug!(session = %session_id, "Ignoring duplicate terminal result");
            return;
        }

        if matches!(result, ResultState::Success(_)) {
            entry.percent = 100;
        }
        entry.message = message.into();
        entry.updated_at = OffsetDateTime::now_utc();
        entry.result = Some(result);
    }

    /// Read a consistent snapshot of the session's progress.
    pub async fn snapshot(&self, session_id: Uuid) -> Option<ProgressSnapshot> {
        let sessions = self.sessions.read().await;
        sessions.get(&session_id).map(|entry| ProgressSnapshot {
            percent: entry.percent,
            message: entry.message.clone(),
            terminal: entry.result.is_some(),
            updated_at: entry.updated_at,
        })
    }

    /// Consume-and-delete retrieval of the terminal result.
    ///
    /// At most one caller observes the result; the session is removed as it
    /// is handed out. Non-terminal sessions are left untouched.
    pub async fn fetch(&self, session_id: Uuid) -> FetchOutcome {
        let mut sessions = self.sessions.write().await;
        let terminal = sessions
            .get(&session_id)
            .is_some_and(|entry| entry.result.is_some());
        if terminal {
            let entry = sessions
                .remove(&session_id)
                .expect("entry present under write lock");
            tracing::debug!(session = %session_id, "Terminal result consumed");
            return FetchOutcome::Ready(entry.result.expect("terminal result just observed"));
        }

        match sessions.get(&session_id) {
            Some(entry) => FetchOutcome::Pending {
                percent: entry.percent,
                message: entry.message.clone(),
            },
            None => FetchOutcome::NotFound,
        }
    }

    /// Purge progress state for an abandoned session.
    ///
    /// Called by the stream server after its idle timeout. A terminal result
    /// that has not been fetched yet is preserved so `fetch` can still
    /// deliver it; only result-less sessions are removed.
    pub async fn reap_idle(&self, session_id: Uuid) {
        let mut sessions = self.sessions.write().await;
        let reapable = sessions
            .get(&session_id)
            .is_some_and(|entry| entry.result.is_none());
        if reapable {
            sessions.remove(&session_id);
            tracing::debug!(session = %session_id, "Reaped idle session progress");
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn percent_never_regresses() {
        let store = ProgressStore::new();
        let session = store.create().await;

        store.update(session, 30, "extracting").await;
        store.update(session, 25, "late straggler").await;
        store.update(session, 95, "merging").await;
        store.update(session, 40, "out of order").await;

        let snapshot = store.snapshot(session).await.expect("session exists");
        assert_eq!(snapshot.percent, 95);
        assert_eq!(snapshot.message, "out of order");
    }

    #[tokio::test]
    async fn percent_is_clamped_to_one_hundred() {
        let store = ProgressStore::new();
        let session = store.create().await;
        store.update(session, 250, "overflow").await;
        let snapshot = store.snapshot(session).await.expect("session exists");
        assert_eq!(snapshot.percent, 100);
    }

    #[tokio::test]
    async fn update_for_unknown_session_is_a_noop() {
        let store = ProgressStore::new();
        store.update(Uuid::new_v4(), 50, "ghost").await;
        assert!(matches!(
            store.fetch(Uuid::new_v4()).await,
            FetchOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn success_implies_full_percent() {
        let store = ProgressStore::new();
        let session = store.create().await;
        store.update(session, 60, "working").await;
        store
            .complete(session, ResultState::Success(json!({"knowledge": {}})), "done")
            .await;

        let snapshot = store.snapshot(session).await.expect("session exists");
        assert_eq!(snapshot.percent, 100);
        assert!(snapshot.terminal);
    }

    #[tokio::test]
    async fn failure_keeps_last_percent() {
        let store = ProgressStore::new();
        let session = store.create().await;
        store.update(session, 25, "chunking").await;
        store
            .complete(
                session,
                ResultState::Failure("text extraction failed".into()),
                "text extraction failed",
            )
            .await;

        let snapshot = store.snapshot(session).await.expect("session exists");
        assert_eq!(snapshot.percent, 25);
        assert!(snapshot.terminal);
    }

    #[tokio::test]
    async fn fetch_consumes_exactly_once() {
        let store = ProgressStore::new();
        let session = store.create().await;
        store
            .complete(session, ResultState::Success(json!({"k": 1})), "done")
            .await;

        assert!(matches!(
            store.fetch(session).await,
            FetchOutcome::Ready(ResultState::Success(_))
        ));
        assert!(matches!(store.fetch(session).await, FetchOutcome::NotFound));
    }

    #[tokio::test]
    async fn fetch_before_completion_reports_pending() {
        let store = ProgressStore::new();
        let session = store.create().await;
        store.update(session, 30, "extracting dimensions").await;

        match store.fetch(session).await {
            FetchOutcome::Pending { percent, message } => {
                assert_eq!(percent, 30);
                assert_eq!(message, "extracting dimensions");
            }
            other => panic!("expected pending, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reap_preserves_unfetched_terminal_results() {
        let store = ProgressStore::new();
        let idle = store.create().await;
        let finished = store.create().await;
        store
            .complete(finished, ResultState::Success(json!({})), "done")
            .await;

        store.reap_idle(idle).await;
        store.reap_idle(finished).await;

        assert!(store.snapshot(idle).await.is_none());
        assert!(matches!(
            store.fetch(finished).await,
            FetchOutcome::Ready(_)
        ));
    }

    #[tokio::test]
    async fn updates_after_terminal_result_are_ignored() {
        let store = ProgressStore::new();
        let session = store.create().await;
        store
            .complete(session, ResultState::Failure("fatal".into()), "fatal")
            .await;
        store.update(session, 99, "zombie update").await;

        let snapshot = store.snapshot(session).await.expect("session exists");
        assert_eq!(snapshot.message, "fatal");
    }
}
