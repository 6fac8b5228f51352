//! Canonical JSON emission (RFC 8785 / JCS).
//!
//! State files and `--json` output go through [`emit_jcs`] so the same state
//! always serializes to the same bytes.

use anyhow::{Context, Result};
use serde::Serialize;

/// Serialize a value to canonical JSON.
///
/// # Example
///
/// ```rust
/// use hldflow_utils::canonicalization::emit_jcs;
/// use serde_json::json;
///
/// let out = emit_jcs(&json!({"b": 1, "a": [true, null]})).unwrap();
/// assert_eq!(out, r#"{"a":[true,null],"b":1}"#);
/// ```
///
/// # Errors
///
/// Fails if the value cannot be represented as JSON.
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}
