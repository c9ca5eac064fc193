//! Duck-typed JSON field handling.
//!
//! Validator responses in the wild put the same field through several shapes:
//! a plain string one call, a list of strings the next, occasionally a nested
//! object. `FieldValue` is the tagged union that absorbs all of them with a
//! single display conversion, instead of runtime type-switching on a generic
//! value at every call site.

use serde::{Deserialize, Serialize};

/// A JSON field that may arrive as a string, a list of strings, or anything
/// else. Deserialization tries the specific shapes first and keeps the raw
/// value otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Opaque(serde_json::Value),
}

impl FieldValue {
    /// Render the field for prompt feedback or user display.
    /// Lists join with "; ", opaque values fall back to compact JSON.
    pub fn to_display_string(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items.join("; "),
            FieldValue::Opaque(v) => v.to_string(),
        }
    }

    /// Whether the field carries no usable content.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.iter().all(|s| s.trim().is_empty()),
            FieldValue::Opaque(v) => v.is_null(),
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Text(String::new())
    }
}
