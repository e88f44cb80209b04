//! Canonical JSON encoding for deterministic serialization.
//!
//! Canonical form:
//! - Object keys sorted by byte-wise string comparison, at every depth
//! - No insignificant whitespace
//! - Array order preserved
//!
//! Policy digests are computed over this form, so the same policy hashes
//! identically regardless of how its JSON was originally written.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// Serialize a value to canonical JSON text.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = canonical_value(value)?;
    serde_json::to_string(&value).map_err(|e| CoreError::Encoding(e.to_string()))
}

/// Convert a value to a JSON tree with every object's keys sorted.
pub fn canonical_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    let value = serde_json::to_value(value).map_err(|e| CoreError::Encoding(e.to_string()))?;
    Ok(sort_keys(value))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, sort_keys(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_at_every_depth() {
        let value = json!({
            "z": 1,
            "a": { "y": true, "b": [ { "d": 1, "c": 2 } ] },
        });

        let text = canonical_json(&value).unwrap();
        assert_eq!(text, r#"{"a":{"b":[{"c":2,"d":1}],"y":true},"z":1}"#);
    }

    #[test]
    fn test_array_order_preserved() {
        let text = canonical_json(&json!([3, 1, 2])).unwrap();
        assert_eq!(text, "[3,1,2]");
    }

    #[test]
    fn test_equivalent_inputs_encode_identically() {
        let a: Value = serde_json::from_str(r#"{ "b": "x",   "a": [1, 2] }"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":[1,2],"b":"x"}"#).unwrap();

        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }
}
