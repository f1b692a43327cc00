//! Conversion of captured values into serialization-safe JSON, and the
//! oversize guard applied before records are written.

use crate::record::value::Captured;
use serde_json::{Map, Number, Value};
use std::str::FromStr;

/// Convert a captured value into a JSON value.
///
/// Pure and total. Tuples become arrays, opaque objects and non-finite
/// floats become their text, and a repeated mapping key keeps its last value.
pub fn normalize(value: Captured) -> Value {
    match value {
        Captured::Null => Value::Null,
        Captured::Bool(b) => Value::Bool(b),
        Captured::Int(text) => number_or_text(text),
        Captured::Float(text) => number_or_text(text),
        Captured::Str(s) => Value::String(s),
        Captured::List(items) | Captured::Tuple(items) => {
            Value::Array(items.into_iter().map(normalize).collect())
        }
        Captured::Dict(pairs) => {
            let mut map = Map::with_capacity(pairs.len());
            for (key, item) in pairs {
                map.insert(key, normalize(item));
            }
            Value::Object(map)
        }
        Captured::Opaque(text) => Value::String(text),
        // Only reachable when the oversize guard was skipped.
        Captured::OversizedInt { digits } => Value::String(format!("<integer with {digits} digits>")),
    }
}

fn number_or_text(text: String) -> Value {
    match Number::from_str(&text) {
        Ok(number) => Value::Number(number),
        Err(_) => Value::String(text),
    }
}

/// True for a top-level integer whose decimal text (sign included) is
/// longer than `max_digits`, and for integers the harness could not render.
pub fn is_oversized(value: &Captured, max_digits: usize) -> bool {
    match value {
        Captured::Int(text) => text.len() > max_digits,
        Captured::OversizedInt { .. } => true,
        _ => false,
    }
}

fn rendered_len(value: &Captured) -> u64 {
    match value {
        Captured::Int(text) => text.len() as u64,
        Captured::OversizedInt { digits } => *digits,
        _ => 0,
    }
}

/// Null an oversized field and append its marker line to `error`.
pub fn apply_oversize_guard(
    field: &str,
    value: &mut Option<Captured>,
    max_digits: usize,
    error: &mut Option<String>,
) {
    let Some(captured) = value.as_ref() else {
        return;
    };
    if !is_oversized(captured, max_digits) {
        return;
    }

    let marker = format!("{} is too large (> {} digits)", field, rendered_len(captured));
    *value = None;
    match error {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(&marker);
        }
        None => *error = Some(marker),
    }
}
