//! Values captured from a sandboxed run.
//!
//! The harness reports the snippet's bindings in a tagged form so nothing is
//! lost in transit: integers travel as decimal text (no digit ceiling on
//! this side), tuples stay distinct from lists, and anything that is not a
//! plain data value arrives as its textual representation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Captured {
    Null,
    Bool(bool),
    /// Decimal text, sign included
    Int(String),
    /// Interpreter repr (`1.5`, `1e+100`, `nan`, `inf`)
    Float(String),
    Str(String),
    List(Vec<Captured>),
    Tuple(Vec<Captured>),
    /// Keys already converted to text, in insertion order
    Dict(Vec<(String, Captured)>),
    /// Textual representation of a non-data object
    Opaque(String),
    /// Integer too large to render even under the raised ceiling
    OversizedInt { digits: u64 },
}

impl Captured {
    pub fn is_null(&self) -> bool {
        matches!(self, Captured::Null)
    }

    /// Mapping keys, when this value is a mapping
    pub fn dict_keys(&self) -> Option<impl Iterator<Item = &str>> {
        match self {
            Captured::Dict(pairs) => Some(pairs.iter().map(|(k, _)| k.as_str())),
            _ => None,
        }
    }
}

impl From<Value> for Captured {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Captured::Null,
            Value::Bool(b) => Captured::Bool(b),
            Value::Number(n) => {
                let text = n.to_string();
                if is_integer_text(&text) {
                    Captured::Int(text)
                } else {
                    Captured::Float(text)
                }
            }
            Value::String(s) => Captured::Str(s),
            Value::Array(items) => Captured::List(items.into_iter().map(Captured::from).collect()),
            Value::Object(map) => Captured::Dict(
                map.into_iter()
                    .map(|(k, v)| (k, Captured::from(v)))
                    .collect(),
            ),
        }
    }
}

pub(crate) fn is_integer_text(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
