//! Chunk-budget heuristics and token-bounded text splitting.
//!
//! Extraction backends enforce a hard input ceiling measured in tokenizer
//! units, so splitting happens on token counts rather than characters.
//! Highlights:
//!
//! - Automatic sizing: derive a budget from the extraction model's context
//!   window and clamp to a conservative range; callers can override via
//!   `CHUNK_MAX_TOKENS`.
//! - Exact reassembly: pieces are verbatim, non-overlapping slices of the
//!   input, so concatenating them reproduces the original text byte for
//!   byte. Chunk index is the merge key used downstream.
//! - Token counting: prefer `tiktoken-rs` for known models/encodings; fall
//!   back to a whitespace counter when no tokenizer is available.

use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, model::get_context_size, o200k_base, p50k_base,
    p50k_edit, r50k_base,
};

use super::types::ChunkingError;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const MIN_AUTOMATIC_CHUNK_BUDGET: usize = 256;
const MAX_AUTOMATIC_CHUNK_BUDGET: usize = 4096;

/// Determine the chunk token budget for a session, respecting overrides.
///
/// Precedence:
/// 1) Explicit override (`CHUNK_MAX_TOKENS`) wins and is clamped at `>= 1`.
/// 2) Otherwise, derive from the extraction model's context window divided
///    by `4`, clamped into `[256, 4096]`.
pub fn determine_chunk_budget(override_budget: Option<usize>, model: &str) -> usize {
    if let Some(explicit) = override_budget {
        return explicit.max(1);
    }

    let window = get_context_size(model);
    let base = (window / 4).max(1);
    base.clamp(MIN_AUTOMATIC_CHUNK_BUDGET, MAX_AUTOMATIC_CHUNK_BUDGET)
}

/// Split text into an ordered sequence of token-bounded pieces.
///
/// - Returns a single piece equal to the input when the whole text fits
///   under the budget.
/// - Pieces are never empty, never overlap, and concatenate back to the
///   original text exactly.
/// - Deterministic: the same text and budget always yield the same pieces.
pub fn chunk_text(
    text: &str,
    budget: usize,
    model: &str,
) -> Result<Vec<String>, ChunkingError> {
    if budget == 0 {
        return Err(ChunkingError::InvalidChunkBudget);
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let token_counter = build_token_counter(model)?;
    Ok(chunk_text_with_counter(text, budget, &token_counter))
}

/// Build a token counter for the given model.
///
/// Uses OpenAI encodings when possible and gracefully falls back to
/// whitespace tokenization for unknown models. The fallback is logged at
/// `warn` level to aid diagnosis while keeping ingestion flowing.
pub(crate) fn build_token_counter(model: &str) -> Result<TokenCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    match resolve_encoding(target) {
        Ok(encoding) => {
            let encoding = Arc::new(encoding);
            Ok(Arc::new(move |segment: &str| {
                encoding.encode_ordinary(segment).len()
            }))
        }
        Err(error) => {
            tracing::warn!(
                model = target,
                error = %error,
                "Tokenizer unavailable; falling back to whitespace counter"
            );
            Ok(default_token_counter())
        }
    }
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, anyhow::Error> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::debug!(model, "Falling back to 'cl100k_base' encoding");
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, anyhow::Error>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

fn default_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

/// Lower-level splitter that accepts an explicit token counter.
///
/// You likely want [`chunk_text`]; this helper exists for tests and for
/// callers that need to plug in a custom token counter.
fn chunk_text_with_counter(text: &str, budget: usize, token_counter: &TokenCounter) -> Vec<String> {
    if token_counter.as_ref()(text) <= budget {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();

    for segment in text.split_inclusive('\n') {
        let mut candidate = current.clone();
        candidate.push_str(segment);
        if token_counter.as_ref()(&candidate) <= budget {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }

        if token_counter.as_ref()(segment) <= budget {
            current.push_str(segment);
        } else {
            current = split_oversized_segment(segment, budget, token_counter, &mut pieces);
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

/// Split a single segment that exceeds the budget on its own.
///
/// Walks characters greedily, emitting full pieces into `pieces` and
/// returning the trailing partial piece so the caller can keep packing.
/// A piece always holds at least one character, so progress is guaranteed
/// even when one character alone exceeds a degenerate budget.
fn split_oversized_segment(
    segment: &str,
    budget: usize,
    token_counter: &TokenCounter,
    pieces: &mut Vec<String>,
) -> String {
    let mut current = String::new();

    for ch in segment.chars() {
        let mut candidate = current.clone();
        candidate.push(ch);
        if token_counter.as_ref()(&candidate) <= budget || current.is_empty() {
            current = candidate;
        } else {
            pieces.push(std::mem::take(&mut current));
            current.push(ch);
        }
    }

    current
}
