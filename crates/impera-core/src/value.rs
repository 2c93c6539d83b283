//! Value kinds and the canonical text encoding used for persistence.
//!
//! Cells hold [`serde_json::Value`]s. A variable's [`ValueKind`] is fixed at
//! construction; `null` has no kind and is never a legal cell value.
//!
//! # Encoding
//!
//! - [`ValueKind::Text`] is stored verbatim and loaded verbatim, so a text
//!   cell can never be reported as corrupted.
//! - Every other kind is stored as compact JSON and parsed back on load.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Runtime kind of a cell value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Text,
    Number,
    Boolean,
    /// Objects and arrays.
    Structured,
}

impl ValueKind {
    /// Kind of `value`, or `None` for `null`.
    #[must_use]
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(_) => Some(Self::Number),
            Value::String(_) => Some(Self::Text),
            Value::Array(_) | Value::Object(_) => Some(Self::Structured),
        }
    }

    /// Lowercase label used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Structured => "structured",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encode `value` into its canonical stored text.
#[must_use]
pub fn encode(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Outcome of decoding stored text against a declared kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Value(Value),
    /// The text parsed (or failed to parse) to a different kind.
    Mismatch(Option<ValueKind>),
}

/// Decode stored text, expecting `kind`.
#[must_use]
pub fn decode(text: &str, kind: ValueKind) -> Decoded {
    if kind == ValueKind::Text {
        return Decoded::Value(Value::String(text.to_owned()));
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value) => match ValueKind::of(&value) {
            Some(found) if found == kind => Decoded::Value(value),
            found => Decoded::Mismatch(found),
        },
        Err(_) => Decoded::Mismatch(None),
    }
}
