//! Two-stage decode of raw extractor payloads.
//!
//! Extraction backends frequently wrap JSON in markdown code fences. The
//! contract here is explicit: a strict parse is attempted first, then one
//! normalizing fence-stripping pass followed by a second parse, and only
//! then is the payload rejected as unparseable.

use super::types::ChunkParseError;
use serde_json::{Map, Value};

/// Decode a raw payload into the partial mapping contributed by one chunk.
///
/// The top level must be a JSON object; arrays and scalars are rejected so
/// the merge engine always folds mappings.
pub(crate) fn decode_partial(raw: &str) -> Result<Map<String, Value>, ChunkParseError> {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(_) => serde_json::from_str::<Value>(&strip_fences(raw))?,
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ChunkParseError::NotAnObject),
    }
}

/// Remove a leading ```lang fence line and a trailing ``` fence line.
fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut lines: Vec<&str> = trimmed.lines().collect();

    if lines
        .first()
        .is_some_and(|line| line.trim_start().starts_with("```"))
    {
        lines.remove(0);
    }
    if lines.last().is_some_and(|line| line.trim() == "```") {
        lines.pop();
    }

    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_parses_directly() {
        let map = decode_partial(r#"{"k": [1, 2]}"#).expect("plain JSON decodes");
        assert_eq!(map["k"], serde_json::json!([1, 2]));
    }

    #[test]
    fn fenced_json_parses_after_stripping() {
        let raw = "```json\n{\"categories\": [\"Loan Eligibility\"]}\n```";
        let map = decode_partial(raw).expect("fenced JSON decodes");
        assert_eq!(map["categories"][0], "Loan Eligibility");
    }

    #[test]
    fn bare_fence_without_language_tag() {
        let raw = "```\n{\"a\": 1}\n```";
        let map = decode_partial(raw).expect("bare-fenced JSON decodes");
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn garbage_fails_both_attempts() {
        let error = decode_partial("not json at all").unwrap_err();
        assert!(matches!(error, ChunkParseError::Json(_)));
    }

    #[test]
    fn non_object_top_level_is_rejected() {
        let error = decode_partial("[1, 2, 3]").unwrap_err();
        assert!(matches!(error, ChunkParseError::NotAnObject));
    }
}
