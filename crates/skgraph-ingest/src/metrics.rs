//! Bibliometric (`ra_metrics`) projection onto product nodes.
//!
//! Each metric is a `{ra_measure, ra_category, ra_value}` triple whose
//! measure/category carry language-tagged labels like `"Influence-alt"` or
//! `"Class C5 Influence-alt"`. Measures become numeric fields
//! (`citation_count`), categories become class fields
//! (`citation_count_class = "C5"`). Labels that match nothing are dropped.

use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::OnceLock;

use crate::decompose::items;
use crate::multilingual::first_value;

/// The metric families a label can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Popularity,
    CitationCount,
    Influence,
    Impulse,
}

impl MetricKind {
    /// Label patterns, most specific first: `Influence-alt` contains
    /// `Influence` and must be tested before it.
    const PATTERNS: [(&'static str, MetricKind); 4] = [
        ("Influence-alt", MetricKind::CitationCount),
        ("Popularity", MetricKind::Popularity),
        ("Influence", MetricKind::Influence),
        ("Impulse", MetricKind::Impulse),
    ];

    pub fn classify(label: &str) -> Option<Self> {
        Self::PATTERNS
            .iter()
            .find(|(pattern, _)| label.contains(pattern))
            .map(|&(_, kind)| kind)
    }

    pub fn value_field(self) -> &'static str {
        match self {
            Self::Popularity => "popularity",
            Self::CitationCount => "citation_count",
            Self::Influence => "influence",
            Self::Impulse => "impulse",
        }
    }

    pub fn class_field(self) -> &'static str {
        match self {
            Self::Popularity => "popularity_class",
            Self::CitationCount => "citation_count_class",
            Self::Influence => "influence_class",
            Self::Impulse => "impulse_class",
        }
    }
}

/// `"Class C5 Influence-alt"` → `Some("C5")`.
pub fn class_code(label: &str) -> Option<&str> {
    static CLASS: OnceLock<Regex> = OnceLock::new();
    let re = CLASS.get_or_init(|| Regex::new(r"Class\s+([A-Z]\d)").expect("static regex"));
    re.captures(label)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// English label of a measure/category (`en`, then `eng`), else the first
/// label present.
pub fn english_label(concept: &Value) -> Option<String> {
    let Some(Value::Object(labels)) = concept.get("labels") else {
        return None;
    };
    let label = labels
        .get("en")
        .or_else(|| labels.get("eng"))
        .or_else(|| labels.values().next())?;
    match first_value(label)? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// Numeric value when `raw` is (or parses as) a finite number, else `raw`
/// unchanged.
pub fn coerce_number(raw: &Value) -> Value {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| raw.clone())
}

/// Project a list of metrics onto `target`. When several metrics map to the
/// same field, the last one wins.
pub fn project_metrics(ra_metrics: &Value, target: &mut Map<String, Value>) {
    for item in items(Some(ra_metrics)) {
        let metric = match item.get("ra_metric") {
            Some(inner @ Value::Object(_)) => inner,
            _ => item,
        };

        if let Some(label) = metric.get("ra_category").and_then(english_label) {
            if let (Some(kind), Some(class)) = (MetricKind::classify(&label), class_code(&label)) {
                target.insert(kind.class_field().to_string(), Value::String(class.to_string()));
            }
        }

        if let Some(label) = metric.get("ra_measure").and_then(english_label) {
            let raw = metric.get("ra_value").filter(|v| !v.is_null());
            if let (Some(kind), Some(raw)) = (MetricKind::classify(&label), raw) {
                target.insert(kind.value_field().to_string(), coerce_number(raw));
            }
        }
    }
}
