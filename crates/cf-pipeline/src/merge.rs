//! Deep merge over JSON values.
//!
//! Nested objects merge key by key; any other pair of values is resolved in
//! favour of the incoming side. Arrays are replaced wholesale, never
//! concatenated, so re-applying the same partial result is idempotent.

use serde_json::{Map, Value};

/// Merge `incoming` over `existing`, returning the merged value.
///
/// Keys absent from `incoming` are preserved unchanged.
pub fn merge(existing: &Value, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Value::Object(base), Value::Object(patch)) => {
            let mut merged = base.clone();
            merge_into(&mut merged, patch.clone());
            Value::Object(merged)
        }
        (_, incoming) => incoming.clone(),
    }
}

/// In-place form of [`merge`] for object maps.
pub fn merge_into(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(patch)) => merge_into(existing, patch),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}
