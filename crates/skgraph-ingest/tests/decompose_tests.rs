//! Decomposition behaviour across entity families.

use serde_json::{json, Value};
use skgraph_ingest::*;

// ============================================================================
// Identity and identifiers
// ============================================================================

#[test]
fn test_missing_local_identifier_yields_no_rows() {
    for kind in EntityKind::ALL {
        let record = json!({
            "entity_type": "x",
            "identifiers": [{"scheme": "doi", "value": "10.1/X"}],
            "contributions": [{"by": "a1"}],
        });
        assert!(decompose(&record, kind.schema()).is_none(), "{kind:?}");
    }
}

#[test]
fn test_shared_identifier_converges_on_one_id() {
    let doi = json!([{"scheme": "doi", "value": "10.1/X"}]);
    let a = decompose(
        &json!({"local_identifier": "prod_a", "identifiers": doi.clone()}),
        EntityKind::Product.schema(),
    )
    .unwrap();
    let b = decompose(
        &json!({"local_identifier": "agent_b", "identifiers": doi}),
        EntityKind::Agent.schema(),
    )
    .unwrap();

    assert_eq!(a.identifiers.len(), 1);
    assert_eq!(b.identifiers.len(), 1);
    assert_eq!(a.identifiers[0].local_identifier, "doi:10.1/X");
    assert_eq!(a.identifiers[0].local_identifier, b.identifiers[0].local_identifier);
}

#[test]
fn test_decomposition_is_deterministic() {
    let record = json!({
        "local_identifier": "P9",
        "titles": {"en": ["A"], "none": "B"},
        "identifiers": [{"scheme": "doi", "value": "10.9/z"}],
        "manifestations": [{"biblio": {"in": "v1"}}, {"dates": {"publication": ["2020"]}}],
        "related_products": {"cites": ["P1"]},
    });
    let first = decompose(&record, EntityKind::Product.schema()).unwrap();
    let second = decompose(&record, EntityKind::Product.schema()).unwrap();
    assert_eq!(first, second);
}

// ============================================================================
// Family-specific shapes
// ============================================================================

#[test]
fn test_topic_labels_flatten_by_language() {
    let record = json!({
        "local_identifier": "topic_1",
        "labels": {"en": ["Oncology", "Cancer"], "it": "Oncologia", "none": ["oncology"]},
    });
    let d = decompose(&record, EntityKind::Topic.schema()).unwrap();

    assert_eq!(d.node.entity_type, "topic");
    assert_eq!(
        Value::Object(d.node.properties.clone()),
        json!({"label_en": "Oncology", "label_it": "Oncologia", "label": "oncology"})
    );
    assert!(d.relationships.is_empty());
}

#[test]
fn test_venue_flattens_access_rights_and_contributions() {
    let record = json!({
        "local_identifier": "venue_1",
        "name": "Journal of Things",
        "access_rights": {"status": "open", "description": ""},
        "contributions": [{"by": "org_1", "role": "publisher"}],
    });
    let d = decompose(&record, EntityKind::Venue.schema()).unwrap();

    assert_eq!(d.node.properties.get("access_rights_status"), Some(&json!("open")));
    assert!(!d.node.properties.contains_key("access_rights_description"));
    let edge = &d.relationships[0];
    assert_eq!(edge.key(), ("org_1", "venue_1", "HAS_CONTRIBUTED_TO"));
    assert_eq!(edge.properties.get("role"), Some(&json!("publisher")));
}

#[test]
fn test_product_end_to_end_shape() {
    let record = json!({
        "local_identifier": "P1",
        "product_type": "literature",
        "titles": {"en": ["Deep sea"]},
        "identifiers": [{"scheme": "doi", "value": "10.5/ABC"}],
        "topics": [{"term": "topic_1"}],
        "contributions": [{"by": "agent_1", "rank": 1, "role": "author"}],
        "manifestations": [
            {"biblio": {"hosting_data_source": "ds_1"}, "identifiers": [{"scheme": "url", "value": "u1"}]},
            {"version": "2"}
        ],
        "funding": ["grant_1"],
        "related_products": {"isSupplementedBy": ["P2"]},
        "ra_metrics": [
            {"ra_category": {"labels": {"en": "Class C5 Influence-alt"}}},
            {"ra_measure": {"labels": {"en": "Influence-alt"}}, "ra_value": "17"},
        ],
    });
    let d = decompose(&record, EntityKind::Product.schema()).unwrap();

    assert_eq!(d.node.properties.get("title_en"), Some(&json!("Deep sea")));
    assert_eq!(d.node.properties.get("citation_count_class"), Some(&json!("C5")));
    assert_eq!(d.node.properties.get("citation_count"), Some(&json!(17.0)));
    assert!(!d.node.properties.contains_key("influence_class"));

    let ids: Vec<_> = d.manifestations.iter().map(|m| m.local_identifier.as_str()).collect();
    assert_eq!(ids, vec!["P1:manifestation:0", "P1:manifestation:1"]);
    assert_eq!(d.identifiers.len(), 2);

    let types: Vec<_> = d.relationships.iter().map(|e| e.edge_type.name()).collect();
    assert_eq!(
        types,
        vec![
            "HAS_PID",
            "HAS_TOPIC",
            "HAS_CONTRIBUTED_TO",
            "HAS_MANIFESTATION",
            "HOSTED_BY",
            "HAS_PID",
            "HAS_MANIFESTATION",
            "FUNDED_BY",
            "IS_SUPPLEMENTED_BY",
        ]
    );
    let related = d.relationships.last().unwrap();
    assert_eq!(related.edge_type.discriminator(), Some(RELATED_PRODUCT));
}

#[test]
fn test_emitted_rows_carry_no_empty_values() {
    let record = json!({
        "local_identifier": "agent_1",
        "name": "",
        "other_names": [],
        "website": null,
        "types": ["person", ""],
        "affiliations": [{"affiliation": "org_1", "role": "", "period": {}}],
    });
    let d = decompose(&record, EntityKind::Agent.schema()).unwrap();

    let node = serde_json::to_value(&d.node).unwrap();
    assert_eq!(
        node,
        json!({
            "local_identifier": "agent_1",
            "entity_type": "agent",
            "types": ["person"],
            "_data": "{\"local_identifier\":\"agent_1\",\"types\":[\"person\"],\"affiliations\":[{\"affiliation\":\"org_1\"}]}",
        })
    );
    assert!(d.relationships[0].properties.is_empty());
}
