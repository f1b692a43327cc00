//! Dataset records: captured values, normalization, code extraction and JSONL I/O.

pub mod extract;
pub mod io;
pub mod normalize;
pub mod value;

use serde_json::{Map, Value};

/// One dataset record; field order is preserved on output.
pub type DatasetEntry = Map<String, Value>;

/// Parse one JSONL line into a record. Non-object JSON is rejected.
pub fn parse_entry(line: &str) -> std::result::Result<DatasetEntry, String> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", json_kind(&other))),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
