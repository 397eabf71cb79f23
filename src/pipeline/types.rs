//! Core data types and error definitions for the ingestion pipeline.

use crate::extract::TextExtractError;
use anyhow::Error as TokenizerError;
use serde_json::{Map, Value};
use thiserror::Error;

/// One of the four independent extraction views produced for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    /// Hierarchical category structure.
    Taxonomy,
    /// Entities and the relationships between them.
    Ontology,
    /// Key terms, definitions, and context.
    Semantics,
    /// Business rules and conditions.
    Rules,
}

impl Dimension {
    /// All dimensions in their canonical composition order.
    pub const ALL: [Dimension; 4] = [
        Dimension::Taxonomy,
        Dimension::Ontology,
        Dimension::Semantics,
        Dimension::Rules,
    ];

    /// Stable lowercase name used as the merge and composition key.
    pub fn name(self) -> &'static str {
        match self {
            Dimension::Taxonomy => "taxonomy",
            Dimension::Ontology => "ontology",
            Dimension::Semantics => "semantics",
            Dimension::Rules => "rules",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Partial structured output for one (dimension, chunk) pair.
///
/// `value` is `None` when the unit of work failed and contributes the neutral
/// merge value instead of aborting the pipeline.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    /// Dimension this contribution belongs to.
    pub dimension: Dimension,
    /// Index of the originating chunk; the merge fold key.
    pub chunk_index: usize,
    /// Parsed partial value, or `None` for an isolated failure.
    pub value: Option<Map<String, Value>>,
}

/// Merged structured value for one dimension across all chunks.
#[derive(Debug, Clone)]
pub struct DimensionAggregate {
    /// Dimension the aggregate describes.
    pub dimension: Dimension,
    /// Result of folding every chunk contribution in chunk-index order.
    pub value: Value,
    /// Number of (dimension, chunk) units that failed and contributed nothing.
    pub failed_chunks: usize,
}

/// Errors produced while splitting extracted text into token-bounded chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible token budget.
    #[error("chunk token budget must be greater than zero")]
    InvalidChunkBudget,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Extraction model we attempted to load a tokenizer for.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors produced while decoding a raw extractor payload into a partial value.
#[derive(Debug, Error)]
pub enum ChunkParseError {
    /// Payload was not valid JSON even after fence stripping.
    #[error("chunk payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Payload parsed, but the top level was not a JSON object.
    #[error("chunk payload is not a JSON object")]
    NotAnObject,
}

/// Fatal errors that abort a session and write a `Failure` result.
///
/// Everything downstream of text extraction degrades gracefully instead of
/// surfacing here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Document text extraction failed; nothing can proceed without text.
    #[error("Failed to extract document text: {0}")]
    TextExtraction(#[from] TextExtractError),
    /// Document produced no usable text.
    #[error("Document produced no extractable text")]
    EmptyDocument,
    /// Chunking step failed to segment the extracted text.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
}
