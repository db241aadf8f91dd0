//! Product manifestations as first-class nodes.
//!
//! Each embedded manifestation gets the id `<product>:manifestation:<i>`,
//! `i` being its position in the source list. The id is positional, not
//! content-derived: reordering the source list renumbers manifestations.

use crate::decompose::{items, Emitter};
use crate::model::{scalar_text, ManifestationNode, RelationType, RelationshipEdge};
use crate::multilingual::first_value;
use crate::normalize::clean_object;
use serde_json::{Map, Value};

/// Date kinds flattened to `<kind>_date`.
pub const DATE_KINDS: [&str; 10] = [
    "acceptance",
    "collected",
    "correction",
    "creation",
    "deposit",
    "embargo",
    "modified",
    "publication",
    "received",
    "retraction",
];

/// Expand every manifestation of `product_id` into `out`.
///
/// Per manifestation: the node, `HAS_MANIFESTATION` from the product,
/// `HOSTED_BY`/`PUBLISHED_IN` when the biblio block names a datasource or
/// venue, then its own identifiers with `HAS_PID` edges.
pub(crate) fn expand(product_id: &str, manifestations: &Value, out: &mut Emitter) {
    for (index, manifestation) in items(Some(manifestations)).iter().enumerate() {
        let Value::Object(manifestation) = manifestation else {
            continue;
        };
        let id = ManifestationNode::synthetic_id(product_id, index);

        out.manifestation(flatten_manifestation(&id, manifestation));
        out.edge(RelationshipEdge::new(product_id, id.clone(), RelationType::HasManifestation));

        if let Some(Value::Object(biblio)) = manifestation.get("biblio") {
            if let Some(datasource) = biblio.get("hosting_data_source").and_then(scalar_text) {
                out.edge(RelationshipEdge::new(id.clone(), datasource, RelationType::HostedBy));
            }
            if let Some(venue) = biblio.get("in").and_then(scalar_text) {
                out.edge(RelationshipEdge::new(id.clone(), venue, RelationType::PublishedIn));
            }
        }

        out.emit_identifiers(&id, manifestation.get("identifiers"));
    }
}

/// Flatten one manifestation object into node properties.
pub fn flatten_manifestation(id: &str, source: &Map<String, Value>) -> ManifestationNode {
    let mut props = Map::new();

    copy(&mut props, source, "version", "version");
    copy(&mut props, source, "licence", "licence");

    if let Some(Value::Object(kind)) = source.get("type") {
        copy(&mut props, kind, "class", "type_class");
        copy(&mut props, kind, "defined_in", "type_defined_in");
        if let Some(label) = kind.get("labels").and_then(preferred_label) {
            props.insert("type_label".to_string(), label.clone());
        }
    }

    if let Some(Value::Object(dates)) = source.get("dates") {
        for kind in DATE_KINDS {
            if let Some(value) = dates.get(kind).and_then(first_value) {
                props.insert(format!("{kind}_date"), value);
            }
        }
    }

    if let Some(Value::Object(review)) = source.get("peer_review") {
        copy(&mut props, review, "status", "peer_review_status");
        copy(&mut props, review, "description", "peer_review_description");
    }

    if let Some(Value::Object(access)) = source.get("access_rights") {
        copy(&mut props, access, "status", "access_rights_status");
        let description = access
            .get("description")
            .filter(|v| !v.is_null())
            .or_else(|| access.get("descriptions"));
        if let Some(description) = description {
            props.insert("access_rights_description".to_string(), description.clone());
        }
    }

    ManifestationNode {
        local_identifier: id.to_string(),
        properties: clean_object(props),
    }
}

/// `eng`, then `en`, then the first label present.
fn preferred_label(labels: &Value) -> Option<&Value> {
    let Value::Object(labels) = labels else {
        return None;
    };
    labels
        .get("eng")
        .or_else(|| labels.get("en"))
        .or_else(|| labels.values().next())
}

fn copy(target: &mut Map<String, Value>, source: &Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = source.get(from) {
        target.insert(to.to_string(), value.clone());
    }
}
