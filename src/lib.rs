#![deny(missing_docs)]

//! Core library for the guideline ingestion server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// External extraction capability boundary.
pub mod extract;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Session-scoped ingestion pipeline.
pub mod pipeline;
/// Session-keyed progress store.
pub mod progress;
/// Progress streaming over server-sent events.
pub mod stream;
