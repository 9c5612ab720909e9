//! Stable plan identity.
//!
//! A plan is hashed over its canonical JSON form: object keys sorted at every
//! level, no insignificant whitespace. Hashing the coerced [`Plan`] (not the
//! raw generator text) means the same plan supplied again with different
//! fences, prose, key order or dropped junk steps maps to the same record.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::plan::Plan;

/// Hex-encoded SHA-256 of the plan's canonical serialization.
pub fn plan_hash(plan: &Plan) -> String {
    let canonical = canonical_json(&plan.to_value());
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Serialize `value` with deterministically sorted object keys.
pub fn canonical_json(value: &Value) -> String {
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
    use crate::core::plan::parse_plan;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"z": [1, {"y": 2, "x": 3}], "c": "s"}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":"s","z":[1,{"x":3,"y":2}]},"b":1}"#
        );
    }

    #[test]
    fn hash_ignores_key_order_fences_and_dropped_steps() {
        let first = parse_plan(
            r#"{"goal":"g","root":".","steps":[{"action":"write","path":"a","content":"x"}]}"#,
        )
        .expect("plan");
        let second = parse_plan(
            "```json\n{\"steps\":[{\"content\":\"x\",\"path\":\"a\",\"action\":\"write\"},{\"action\":\"nope\"}],\"root\":\".\",\"goal\":\"g\"}\n```",
        )
        .expect("plan");
        assert_eq!(plan_hash(&first), plan_hash(&second));
        assert_eq!(plan_hash(&first).len(), 64);
    }

    #[test]
    fn hash_changes_with_step_content() {
        let a = parse_plan(r#"{"steps":[{"action":"write","path":"a","content":"x"}]}"#)
            .expect("plan");
        let b = parse_plan(r#"{"steps":[{"action":"write","path":"a","content":"y"}]}"#)
            .expect("plan");
        assert_ne!(plan_hash(&a), plan_hash(&b));
    }
}
