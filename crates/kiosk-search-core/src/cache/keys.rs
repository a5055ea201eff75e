//! Deterministic cache key generation.

use crate::config::CacheDefaults;
use serde::Serialize;
use serde_json::Value;

/// Build `namespace:hash` from an ordered list of values.
///
/// Objects are serialized with sorted keys first, so logically equal inputs
/// produce the same key in every run.
pub fn generate_key(namespace: &str, parts: &[Value]) -> String {
    let mut canonical = String::new();
    canonical.push('[');
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            canonical.push(',');
        }
        write_canonical(part, &mut canonical);
    }
    canonical.push(']');

    let digest = blake3::hash(canonical.as_bytes());
    let hex = hex::encode(digest.as_bytes());
    format!("{}:{}", namespace, &hex[..CacheDefaults::KEY_HASH_LEN])
}

/// Key for any serializable value, treated as a single part.
pub fn key_for<T: Serialize + ?Sized>(namespace: &str, part: &T) -> String {
    let value = serde_json::to_value(part).unwrap_or(Value::Null);
    generate_key(namespace, &[value])
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
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
    fn test_key_shape() {
        let key = generate_key("query", &[json!("stmt_1"), json!([1, 2])]);
        let (ns, hash) = key.split_once(':').unwrap();
        assert_eq!(ns, "query");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_object_key_order_is_irrelevant() {
        let a = generate_key("count", &[json!({"city": "Boston", "year": 2020})]);
        let b = generate_key("count", &[json!({"year": 2020, "city": "Boston"})]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_part_order_matters() {
        let a = generate_key("q", &[json!(1), json!(2)]);
        let b = generate_key("q", &[json!(2), json!(1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_statement_keys_follow_params() {
        let boston = key_for("query:alumni", &("stmt_1", vec!["Boston"]));
        assert_eq!(boston, key_for("query:alumni", &("stmt_1", vec!["Boston"])));
        assert_ne!(boston, key_for("query:alumni", &("stmt_1", vec!["NY"])));
        assert!(boston.starts_with("query:alumni:"));
    }

    #[test]
    fn test_namespace_separates_keys() {
        assert_ne!(key_for("query", "x"), key_for("count", "x"));
        assert_eq!(key_for("query", "x"), key_for("query", "x"));
    }
}
