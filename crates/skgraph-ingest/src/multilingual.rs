//! Flattening of language-tagged value maps.

use serde_json::{Map, Value};

/// Language tag for values with no declared language.
pub const NO_LANGUAGE: &str = "none";

/// Copy a `{lang: value | [values]}` map into flat, language-suffixed keys.
///
/// `{"none": ["T"], "en": ["T-en"], "fr": "T-fr"}` with base key `title`
/// writes `title = "T"`, `title_en = "T-en"`, `title_fr = "T-fr"`.
///
/// Only the first element of a list is kept; alternates are discarded.
/// Empty lists write nothing. A non-object `source` is ignored. Existing
/// keys in `target` are never removed, only overwritten.
pub fn add_multilingual_fields(target: &mut Map<String, Value>, source: &Value, base_key: &str) {
    let Value::Object(source) = source else {
        return;
    };

    if let Some(value) = source.get(NO_LANGUAGE).and_then(first_value) {
        target.insert(base_key.to_string(), value);
    }

    for (lang, values) in source {
        if lang == NO_LANGUAGE {
            continue;
        }
        if let Some(value) = first_value(values) {
            target.insert(format!("{base_key}_{lang}"), value);
        }
    }
}

/// The value itself, or the first element when it is a list.
pub(crate) fn first_value(value: &Value) -> Option<Value> {
    match value {
        Value::Array(items) => items.first().cloned(),
        Value::Null => None,
        other => Some(other.clone()),
    }
}
