//! Canonical JSON serialization.
//!
//! Object keys are emitted in sorted order at every depth so two values that
//! differ only in key order serialize identically. Used for cache
//! fingerprints.

use serde_json::Value;

/// Serialize `value` with recursively sorted object keys.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (position, key) in keys.into_iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (position, item) in items.iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let left = json!({"b": 1, "a": {"y": [1, {"q": 2, "p": 1}], "x": null}});
        let right = json!({"a": {"x": null, "y": [1, {"p": 1, "q": 2}]}, "b": 1});
        assert_eq!(canonical_string(&left), canonical_string(&right));
        assert_eq!(canonical_string(&json!({"b": 1, "a": "z"})), r#"{"a":"z","b":1}"#);
    }

    #[test]
    fn array_order_is_significant() {
        assert_ne!(canonical_string(&json!([1, 2])), canonical_string(&json!([2, 1])));
    }
}
