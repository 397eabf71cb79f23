//! Session-scoped ingestion pipeline: chunking, fan-out, decode, and merge.

pub mod chunking;
mod decode;
pub mod merge;
pub mod orchestrator;
mod service;
pub mod types;

pub use service::{IngestionApi, IngestionService};
pub use types::{
    ChunkParseError, ChunkResult, ChunkingError, Dimension, DimensionAggregate, PipelineError,
};
