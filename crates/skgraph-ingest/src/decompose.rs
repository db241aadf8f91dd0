//! The schema-driven entity decomposition engine.

use crate::manifestation;
use crate::metrics;
use crate::model::{
    scalar_text, EdgeType, EntityNode, IdentifierNode, ManifestationNode, RelationType,
    RelationshipEdge,
};
use crate::multilingual::add_multilingual_fields;
use crate::normalize::{clean_empty, clean_object};
use crate::schema::{Direction, EntityKind, EntitySchema, PropertyRule, RelationRule};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Everything one source entity turns into.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub kind: EntityKind,
    pub node: EntityNode,
    pub identifiers: Vec<IdentifierNode>,
    pub manifestations: Vec<ManifestationNode>,
    pub relationships: Vec<RelationshipEdge>,
}

/// Decompose one entity record according to `schema`.
///
/// Returns `None` when the record is not an object or carries no
/// `local_identifier`; that record contributes nothing.
pub fn decompose(record: &Value, schema: &EntitySchema) -> Option<Decomposition> {
    let Value::Object(raw) = record else {
        return None;
    };
    let Some(entity_id) = raw.get("local_identifier").and_then(scalar_text) else {
        tracing::debug!(kind = ?schema.kind, "record without local_identifier skipped");
        return None;
    };

    let mut record = raw.clone();
    for alias in schema.aliases {
        if !record.contains_key(alias.to) {
            if let Some(value) = record.get(alias.from).cloned() {
                record.insert(alias.to.to_string(), value);
            }
        }
    }

    let node = project_node(&entity_id, &record, schema);

    let mut emitter = Emitter::default();
    emitter.emit_identifiers(&entity_id, record.get("identifiers"));
    for rule in schema.relations {
        emit_relation(&entity_id, &record, rule, &mut emitter);
    }

    Some(Decomposition {
        kind: schema.kind,
        node,
        identifiers: emitter.identifiers,
        manifestations: emitter.manifestations,
        relationships: emitter.edges,
    })
}

fn project_node(entity_id: &str, record: &Map<String, Value>, schema: &EntitySchema) -> EntityNode {
    let mut properties = Map::new();

    for &field in schema.fields {
        if let Some(value) = record.get(field).filter(|v| !v.is_null()) {
            properties.insert(field.to_string(), value.clone());
        }
    }

    for ml in schema.multilingual {
        if let Some(source) = record.get(ml.source) {
            add_multilingual_fields(&mut properties, source, ml.base_key);
        }
    }

    for nested in schema.nested {
        let Some(Value::Object(inner)) = record.get(nested.source) else {
            continue;
        };
        for &key in nested.keys {
            if let Some(value) = inner.get(key) {
                properties.insert(format!("{}_{}", nested.prefix, key), value.clone());
            }
        }
    }

    for &field in schema.json_strings {
        if let Some(value) = record.get(field).filter(|v| !v.is_null()) {
            properties.insert(field.to_string(), Value::String(value.to_string()));
        }
    }

    if schema.metrics {
        if let Some(ra_metrics) = record.get("ra_metrics") {
            metrics::project_metrics(ra_metrics, &mut properties);
        }
    }

    let entity_type = record
        .get("entity_type")
        .and_then(scalar_text)
        .unwrap_or_else(|| schema.kind.canonical_type().to_string());

    let data = clean_empty(Value::Object(record.clone())).to_string();

    EntityNode {
        local_identifier: entity_id.to_string(),
        entity_type,
        properties: clean_object(properties),
        data,
    }
}

fn emit_relation(entity_id: &str, record: &Map<String, Value>, rule: &RelationRule, out: &mut Emitter) {
    match rule {
        RelationRule::Reference { field, relation } => {
            for target in references(record.get(*field)) {
                out.edge(RelationshipEdge::new(entity_id, target, *relation));
            }
        }

        RelationRule::Objects {
            field,
            target,
            relation,
            direction,
            properties,
        } => {
            for item in items(record.get(*field)) {
                let Value::Object(item) = item else {
                    continue;
                };
                let Some(other) = item.get(*target).and_then(scalar_text) else {
                    continue;
                };
                let (start, end) = match direction {
                    Direction::Outgoing => (entity_id.to_string(), other),
                    Direction::Incoming => (other, entity_id.to_string()),
                };
                let props = edge_properties(item, properties);
                out.edge(RelationshipEdge::new(start, end, *relation).with_properties(props));
            }
        }

        RelationRule::RelatedProducts { field } => {
            let Some(Value::Object(related)) = record.get(*field) else {
                return;
            };
            for (relation_name, targets) in related {
                let edge_type = EdgeType::related_product(relation_name);
                if edge_type.name().trim().is_empty() {
                    tracing::debug!(entity = entity_id, "unnamed related-product relation skipped");
                    continue;
                }
                for target in references(Some(targets)) {
                    out.edge(RelationshipEdge::new(entity_id, target, edge_type.clone()));
                }
            }
        }

        RelationRule::Manifestations { field } => {
            if let Some(manifestations) = record.get(*field) {
                manifestation::expand(entity_id, manifestations, out);
            }
        }
    }
}

fn edge_properties(item: &Map<String, Value>, rules: &[PropertyRule]) -> Map<String, Value> {
    let mut props = Map::new();
    for rule in rules {
        match rule {
            PropertyRule::Copy(key) => {
                if let Some(value) = item.get(*key) {
                    props.insert(key.to_string(), value.clone());
                }
            }
            PropertyRule::Path { path, key } => {
                let Some((first, rest)) = path.split_first() else {
                    continue;
                };
                let mut cursor = item.get(*first);
                for step in rest {
                    cursor = cursor.and_then(|v| v.get(*step));
                }
                if let Some(value) = cursor {
                    props.insert(key.to_string(), value.clone());
                }
            }
            PropertyRule::Json(key) => {
                if let Some(value) = item.get(*key).filter(|v| !v.is_null()) {
                    props.insert(key.to_string(), Value::String(value.to_string()));
                }
            }
        }
    }
    clean_object(props)
}

/// A list field, or a single object treated as a one-element list.
pub(crate) fn items(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        Some(single @ Value::Object(_)) => std::slice::from_ref(single),
        _ => &[],
    }
}

/// Target ids from a single id or a list of ids.
fn references(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(other) => scalar_text(other).into_iter().collect(),
        None => Vec::new(),
    }
}

// ============================================================================
// Emitter
// ============================================================================

/// Collects one record's output, coalescing repeats.
///
/// Identifier nodes are unique by `local_identifier` and edges by
/// `(start, end, type)`: a repeated edge folds its properties into the
/// first occurrence, keys already present keeping their first value.
#[derive(Debug, Default)]
pub(crate) struct Emitter {
    identifiers: Vec<IdentifierNode>,
    manifestations: Vec<ManifestationNode>,
    edges: Vec<RelationshipEdge>,
    seen_identifiers: HashSet<String>,
    edge_index: HashMap<(String, String, String), usize>,
}

impl Emitter {
    pub(crate) fn emit_identifiers(&mut self, owner: &str, identifiers: Option<&Value>) {
        for source in items(identifiers) {
            let Some(identifier) = IdentifierNode::from_source(source) else {
                continue;
            };
            let edge = RelationshipEdge::new(
                owner,
                identifier.local_identifier.clone(),
                RelationType::HasPid,
            )
            .with_scheme(identifier.scheme.clone());

            if self.seen_identifiers.insert(identifier.local_identifier.clone()) {
                self.identifiers.push(identifier);
            }
            self.edge(edge);
        }
    }

    pub(crate) fn manifestation(&mut self, node: ManifestationNode) {
        self.manifestations.push(node);
    }

    pub(crate) fn edge(&mut self, edge: RelationshipEdge) {
        if edge.start.is_empty() || edge.end.is_empty() {
            return;
        }
        let key = (
            edge.start.clone(),
            edge.end.clone(),
            edge.edge_type.name().to_string(),
        );
        match self.edge_index.get(&key) {
            Some(&i) => {
                let first = &mut self.edges[i];
                for (k, v) in edge.properties {
                    first.properties.entry(k).or_insert(v);
                }
                if first.scheme.is_none() {
                    first.scheme = edge.scheme;
                }
            }
            None => {
                self.edge_index.insert(key, self.edges.len());
                self.edges.push(edge);
            }
        }
    }
}
