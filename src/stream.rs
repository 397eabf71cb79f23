//! Progress streaming over server-sent events.
//!
//! Per session the stream moves through a small state machine: it polls the
//! progress store on a fixed interval, emits an event only when the observed
//! `(percent, message)` pair changed since the last emission, and closes in
//! one of three ways: after the terminal event plus one grace period, after
//! a bounded run of unchanged polls (which also reaps idle progress state),
//! or immediately with an error event for an unknown session. Delivery is
//! best-effort; the background computation continues regardless of whether
//! anyone is listening.

use crate::config::get_config;
use crate::progress::ProgressStore;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_core::Stream;
use futures_util::StreamExt;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Timing knobs for one progress stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Interval between store polls.
    pub poll_interval: Duration,
    /// Unchanged-progress ceiling before the stream closes with a timeout.
    pub idle_timeout: Duration,
    /// Delay between the final event and stream close.
    pub grace_period: Duration,
}

impl StreamSettings {
    /// Build settings from the process configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        Self {
            poll_interval: config.progress_poll_interval,
            idle_timeout: config.stream_idle_timeout,
            grace_period: config.stream_grace_period,
        }
    }
}

/// One observation delivered to a subscribed client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProgressUpdate {
    /// Progress changed since the last emission.
    Progress {
        /// Completion percentage.
        percent: u8,
        /// Status message for the current stage.
        message: String,
    },
    /// The session is unknown or was already reaped.
    NotFound,
}

#[derive(Debug)]
enum StreamClose {
    Completed,
    Timeout,
    NotFound,
}

/// Poll the store and yield de-duplicated progress updates for one session.
///
/// The value-level core of the stream server; [`progress_sse`] wraps it into
/// an SSE response.
pub fn progress_updates(
    store: Arc<ProgressStore>,
    session_id: Uuid,
    settings: StreamSettings,
) -> impl Stream<Item = ProgressUpdate> {
    async_stream::stream! {
        let poll_ms = settings.poll_interval.as_millis().max(1);
        let max_idle_polls = (settings.idle_timeout.as_millis() / poll_ms).max(1);

        let mut interval = tokio::time::interval(settings.poll_interval);
        let mut last_emitted: Option<(u8, String)> = None;
        let mut idle_polls: u128 = 0;
        let close;

        loop {
            interval.tick().await;

            let Some(snapshot) = store.snapshot(session_id).await else {
                yield ProgressUpdate::NotFound;
                close = StreamClose::NotFound;
                break;
            };

            let observed = (snapshot.percent, snapshot.message);
            if last_emitted.as_ref() != Some(&observed) {
                idle_polls = 0;
                yield ProgressUpdate::Progress {
                    percent: observed.0,
                    message: observed.1.clone(),
                };
                last_emitted = Some(observed);
                if snapshot.terminal {
                    tokio::time::sleep(settings.grace_period).await;
                    close = StreamClose::Completed;
                    break;
                }
            } else if snapshot.terminal {
                // Terminal state already delivered on a previous poll.
                close = StreamClose::Completed;
                break;
            } else {
                idle_polls += 1;
                if idle_polls >= max_idle_polls {
                    store.reap_idle(session_id).await;
                    close = StreamClose::Timeout;
                    break;
                }
            }
        }

        tracing::debug!(session = %session_id, close = ?close, "Progress stream closed");
    }
}

/// SSE response streaming a session's progress to one client.
pub fn progress_sse(
    store: Arc<ProgressStore>,
    session_id: Uuid,
    settings: StreamSettings,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = progress_updates(store, session_id, settings).map(move |update| {
        let event = match update {
            ProgressUpdate::Progress { percent, message } => Event::default()
                .data(json!({ "percent": percent, "message": message }).to_string()),
            ProgressUpdate::NotFound => Event::default().event("error").data(
                json!({ "error": "session not found", "session_id": session_id.to_string() })
                    .to_string(),
            ),
        };
        Ok(event)
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
