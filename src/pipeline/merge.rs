//! Type-directed merge of partial extraction results.
//!
//! Each dimension's chunk contributions are folded in chunk-index order, not
//! arrival order, so concurrent completion order never changes the output.
//! Merge rules, applied key by key:
//!
//! - mapping + mapping: deep-merge, later chunk wins on conflict, recursively
//! - sequence + sequence: concatenate in chunk order
//! - anything else: later chunk's value wins
//! - a neutral contribution (failed unit) contributes nothing
//!
//! The final composition nests the four aggregates under a single root key
//! and performs no further type coercion.

use super::types::{ChunkResult, Dimension, DimensionAggregate};
use serde_json::{Map, Value};

/// Root key under which the four dimension aggregates are composed.
pub const ROOT_KEY: &str = "knowledge";

/// Identity element of the merge: the empty mapping.
pub fn neutral_value() -> Value {
    Value::Object(Map::new())
}

/// Fold one dimension's chunk contributions into a single aggregate.
///
/// Results are ordered by chunk index before folding; the caller may hand
/// them over in any order.
pub fn fold_dimension(dimension: Dimension, mut results: Vec<ChunkResult>) -> DimensionAggregate {
    results.sort_by_key(|result| result.chunk_index);

    let mut value = neutral_value();
    let mut failed_chunks = 0usize;
    for result in results {
        debug_assert_eq!(result.dimension, dimension);
        match result.value {
            Some(partial) => value = merge_values(value, Value::Object(partial)),
            None => failed_chunks += 1,
        }
    }

    DimensionAggregate {
        dimension,
        value,
        failed_chunks,
    }
}

/// Merge two structured values, with `later` taking precedence on conflict.
pub fn merge_values(earlier: Value, later: Value) -> Value {
    match (earlier, later) {
        (Value::Object(mut base), Value::Object(update)) => {
            for (key, incoming) in update {
                match base.remove(&key) {
                    Some(existing) => {
                        base.insert(key, merge_values(existing, incoming));
                    }
                    None => {
                        base.insert(key, incoming);
                    }
                }
            }
            Value::Object(base)
        }
        (Value::Array(mut base), Value::Array(tail)) => {
            base.extend(tail);
            Value::Array(base)
        }
        (_, later) => later,
    }
}

/// Compose the four dimension aggregates into the final document.
///
/// Structural composition only: each aggregate lands under its dimension
/// name beneath [`ROOT_KEY`], unchanged.
pub fn finalize(aggregates: &[DimensionAggregate]) -> Value {
    let mut body = Map::new();
    for aggregate in aggregates {
        body.insert(
            aggregate.dimension.name().to_string(),
            aggregate.value.clone(),
        );
    }

    let mut root = Map::new();
    root.insert(ROOT_KEY.to_string(), Value::Object(body));
    Value::Object(root)
}
