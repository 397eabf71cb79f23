//! External extraction capability boundary.
//!
//! The pipeline only depends on two contracts: turning a raw document into
//! text, and turning one (dimension, chunk) pair into a raw structured
//! payload. Production deployments back these with a remote document
//! intelligence service and a model endpoint; the built-in implementations
//! are deterministic local fallbacks so the server works out of the box.

use crate::pipeline::Dimension;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by document text extraction.
#[derive(Debug, Error)]
pub enum TextExtractError {
    /// Provider was unable to produce text for the supplied document.
    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),
}

/// Errors raised by per-dimension structured extraction.
#[derive(Debug, Error)]
pub enum DimensionExtractError {
    /// Provider was unable to produce a payload for the chunk.
    #[error("dimension extraction failed: {0}")]
    ExtractionFailed(String),
}

/// Interface implemented by document text extraction backends.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Produce the full text of the supplied document.
    async fn extract_text(&self, document: &[u8]) -> Result<String, TextExtractError>;
}

/// Interface implemented by per-dimension structured extraction backends.
///
/// The returned payload is a raw string; the pipeline applies its own
/// two-stage JSON decode, so implementations may emit fenced model output
/// verbatim.
#[async_trait]
pub trait DimensionExtractor: Send + Sync {
    /// Extract one dimension's partial structure from a single chunk.
    async fn extract(
        &self,
        dimension: Dimension,
        chunk: &str,
    ) -> Result<String, DimensionExtractError>;
}

/// Pass-through text extractor for documents that are already plain text.
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    /// Construct a new pass-through extractor instance.
    pub const fn new() -> Self {
        Self
    }
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract_text(&self, document: &[u8]) -> Result<String, TextExtractError> {
        let text = std::str::from_utf8(document).map_err(|err| {
            TextExtractError::ExtractionFailed(format!("document is not UTF-8 text: {err}"))
        })?;
        tracing::debug!(bytes = document.len(), "Extracted document text");
        Ok(text.to_string())
    }
}

/// Deterministic keyword-based fallback extractor.
///
/// Produces a small JSON payload per dimension derived from surface features
/// of the chunk. Useful for local development and tests; not a substitute
/// for a real extraction model.
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    /// Construct a new heuristic extractor instance.
    pub const fn new() -> Self {
        Self
    }

    fn headings(chunk: &str) -> Vec<String> {
        chunk
            .lines()
            .map(str::trim)
            .filter(|line| line.ends_with(':') && line.len() > 1)
            .map(|line| line.trim_end_matches(':').to_string())
            .collect()
    }

    fn capitalized_terms(chunk: &str) -> Vec<String> {
        let mut terms: Vec<String> = chunk
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| word.len() > 3)
            .filter(|word| word.chars().next().is_some_and(char::is_uppercase))
            .map(str::to_string)
            .collect();
        terms.sort();
        terms.dedup();
        terms
    }

    fn rule_sentences(chunk: &str) -> Vec<String> {
        chunk
            .split(['.', '\n'])
            .map(str::trim)
            .filter(|sentence| {
                let lower = sentence.to_lowercase();
                lower.contains("must") || lower.contains("shall") || lower.contains("required")
            })
            .map(str::to_string)
            .collect()
    }
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DimensionExtractor for HeuristicExtractor {
    async fn extract(
        &self,
        dimension: Dimension,
        chunk: &str,
    ) -> Result<String, DimensionExtractError> {
        let payload = match dimension {
            Dimension::Taxonomy => json!({ "categories": Self::headings(chunk) }),
            Dimension::Ontology => json!({ "entities": Self::capitalized_terms(chunk) }),
            Dimension::Semantics => json!({ "terms": Self::capitalized_terms(chunk) }),
            Dimension::Rules => json!({ "rules": Self::rule_sentences(chunk) }),
        };
        serde_json::to_string(&payload)
            .map_err(|err| DimensionExtractError::ExtractionFailed(err.to_string()))
    }
}

/// Build the text extractor for the current deployment.
pub fn get_text_extractor() -> Arc<dyn TextExtractor> {
    Arc::new(PlainTextExtractor::new())
}

/// Build the per-dimension extractor for the current deployment.
pub fn get_dimension_extractor() -> Arc<dyn DimensionExtractor> {
    Arc::new(HeuristicExtractor::new())
}
