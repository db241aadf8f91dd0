//! Recursive pruning of null and empty values.
//!
//! Every row the pipeline writes has been through [`clean_empty`], so no
//! emitted object carries a key whose value is `null`, `""`, `[]` or `{}`.
//! Falsy-but-meaningful scalars (`0`, `false`) are kept.

use serde_json::{Map, Value};

/// Remove null/empty values from objects and arrays, recursively.
///
/// - object: drop a key when its cleaned value is null, `""`, or an empty
///   container
/// - array: clean each element and drop the ones that end up empty; the
///   array itself may come back empty and is then dropped by its parent
/// - scalars pass through unchanged
///
/// The top-level value keeps its shape, so cleaning `{"a": null}` yields
/// `{}` rather than `null`. Idempotent.
pub fn clean_empty(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(clean_object(map)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(clean_empty)
                .filter(|v| !is_empty_value(v))
                .collect(),
        ),
        other => other,
    }
}

/// [`clean_empty`] specialised to an object.
pub fn clean_object(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter_map(|(k, v)| {
            let v = clean_empty(v);
            (!is_empty_value(&v)).then_some((k, v))
        })
        .collect()
}

/// True for the values the normalizer prunes.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
