//! End-to-end tests for loading and duplicate resolution

use super::*;
use serde_json::{json, Value};
use skgraph_ingest::{decompose, Decomposition, EntityKind};
use std::collections::BTreeSet;

fn decompositions(records: &[(EntityKind, Value)]) -> Vec<Decomposition> {
    records
        .iter()
        .filter_map(|(kind, record)| decompose(record, kind.schema()))
        .collect()
}

/// Helper to create a loaded store
fn loaded(records: &[(EntityKind, Value)]) -> GraphStore {
    let store = GraphStore::default();
    GraphLoader::new(store.clone())
        .load(&decompositions(records))
        .unwrap();
    store
}

fn product(id: &str, source: Option<&str>, doi: &str) -> (EntityKind, Value) {
    let mut record = json!({
        "local_identifier": id,
        "identifiers": [{"scheme": "doi", "value": doi}],
    });
    if let Some(source) = source {
        record["source"] = json!(source);
    }
    (EntityKind::Product, record)
}

fn exists(store: &GraphStore, label: &str, id: &str) -> bool {
    store.read(|db| db.node_id(label, id).is_some())
}

/// `TYPE->end` for every outgoing edge of a node.
fn outgoing(store: &GraphStore, label: &str, id: &str) -> BTreeSet<String> {
    store.read(|db| {
        let node = db.node_id(label, id).unwrap();
        db.outgoing(node, None)
            .into_iter()
            .map(|e| format!("{}->{}", e.edge_type, db.node(e.end).unwrap().local_identifier))
            .collect()
    })
}

fn member(id: &str, source: Option<&str>) -> ProductRef {
    ProductRef {
        node: 0,
        local_identifier: id.to_string(),
        source: source.map(str::to_string),
    }
}

// ============================================================================
// Survivor selection
// ============================================================================

#[test]
fn test_survivor_is_smallest_untagged_member() {
    let members = vec![member("A", Some("x")), member("C", None), member("B", None)];
    let survivor = select_survivor("10.1/x", &members).unwrap();
    assert_eq!(survivor.local_identifier, "B");
}

#[test]
fn test_all_tagged_group_has_no_survivor() {
    let members = vec![member("A", Some("x")), member("B", Some("x"))];
    match select_survivor("10.1/x", &members) {
        Err(MergeError::NoSurvivor { doi }) => assert_eq!(doi, "10.1/x"),
        other => panic!("expected NoSurvivor, got {other:?}"),
    }
}

// ============================================================================
// Grouping
// ============================================================================

#[test]
fn test_groups_need_a_tagged_member_and_more_than_one_product() {
    let store = loaded(&[
        product("A", Some("ebrains"), "10.1/X"),
        product("B", None, "10.1/x"),
        product("C", None, "10.2/Y"),
        product("D", None, "10.2/Y"),
        product("E", Some("ebrains"), "10.3/Z"),
        product("F", Some("other"), "10.4/W"),
        product("G", None, "10.4/W"),
    ]);

    let groups = DuplicateResolver::new(store).groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].doi, "10.1/x");
    let ids: Vec<_> = groups[0].members.iter().map(|m| m.local_identifier.as_str()).collect();
    assert_eq!(ids, vec!["A", "B"]);
    assert_eq!(groups[0].members[0].source.as_deref(), Some("ebrains"));
}

#[test]
fn test_custom_policy_changes_the_tag() {
    let store = loaded(&[product("F", Some("other"), "10.4/W"), product("G", None, "10.4/W")]);
    let policy = MergePolicy {
        source_tag: "other".to_string(),
        ..MergePolicy::default()
    };
    let resolver = DuplicateResolver::with_policy(store.clone(), policy);

    let outcome = resolver.resolve_group("10.4/W").unwrap();
    assert_eq!(outcome.survivor, "G");
    assert!(!exists(&store, "Product", "F"));
}

// ============================================================================
// Merging
// ============================================================================

#[test]
fn test_merge_copies_only_missing_schemes() {
    let (kind, mut dup) = product("A", Some("ebrains"), "10.1/X");
    dup["identifiers"] = json!([
        {"scheme": "doi", "value": "10.1/X"},
        {"scheme": "pmid", "value": "111"},
        {"scheme": "arxiv", "value": "2101.1"},
    ]);
    let (_, mut keep) = product("B", None, "10.1/X");
    keep["identifiers"] = json!([
        {"scheme": "doi", "value": "10.1/X"},
        {"scheme": "pmid", "value": "222"},
    ]);
    let store = loaded(&[(kind, dup), (kind, keep)]);

    let outcome = DuplicateResolver::new(store.clone())
        .resolve_group("10.1/x")
        .unwrap();

    assert_eq!(outcome.survivor, "B");
    assert_eq!(outcome.merges.len(), 1);
    assert_eq!(outcome.merges[0].copied_pids, vec!["arxiv:2101.1"]);
    assert_eq!(outcome.merges[0].orphans_removed, 1);

    let expected: BTreeSet<String> = ["HAS_PID->doi:10.1/X", "HAS_PID->pmid:222", "HAS_PID->arxiv:2101.1"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(outgoing(&store, "Product", "B"), expected);
    assert!(!exists(&store, "Product", "A"));
    assert!(!exists(&store, "Pid", "pmid:111"));

    store.read(|db| {
        let b = db.node_id("Product", "B").unwrap();
        let arxiv = db.node_id("Pid", "arxiv:2101.1").unwrap();
        let edge = db.find_edge(b, "HAS_PID", arxiv).unwrap();
        assert_eq!(edge.props.get("scheme"), Some(&json!("arxiv")));
    });
}

#[test]
fn test_orphan_sweep_is_one_hop_and_spares_shared_neighbors() {
    let (kind, mut dup) = product("A", Some("ebrains"), "10.1/X");
    dup["topics"] = json!([{"term": "t_shared"}, {"term": "t_own"}]);
    dup["manifestations"] = json!([{"biblio": {"hosting_data_source": "ds_1"}}]);
    dup["related_products"] = json!({"cites": ["P9"]});
    let (_, mut keep) = product("B", None, "10.1/X");
    keep["topics"] = json!([{"term": "t_shared"}]);

    let store = loaded(&[
        (EntityKind::Topic, json!({"local_identifier": "t_shared"})),
        (EntityKind::Topic, json!({"local_identifier": "t_own"})),
        (EntityKind::Datasource, json!({"local_identifier": "ds_1", "name": "Repo"})),
        (kind, dup),
        (kind, keep),
    ]);

    let outcome = DuplicateResolver::new(store.clone())
        .resolve_group("10.1/x")
        .unwrap();
    assert_eq!(outcome.merges[0].orphans_removed, 2);

    assert!(exists(&store, "Topic", "t_shared"));
    assert!(!exists(&store, "Topic", "t_own"));
    assert!(!exists(&store, "Manifestation", "A:manifestation:0"));
    assert!(exists(&store, "Datasource", "ds_1"));
    assert!(exists(&store, "Product", "P9"));
    assert!(outgoing(&store, "Product", "B").contains("HAS_TOPIC->t_shared"));
}

#[test]
fn test_merging_twice_is_an_explicit_error() {
    let store = loaded(&[product("A", Some("ebrains"), "10.1/X"), product("B", None, "10.1/X")]);
    let resolver = DuplicateResolver::new(store.clone());
    resolver.resolve_group("10.1/x").unwrap();
    let before = outgoing(&store, "Product", "B");

    let again = store.write(|txn| merge_duplicate(txn, "B", "A", resolver.policy()));
    assert!(matches!(again, Err(MergeError::DuplicateNotFound { .. })));
    assert!(matches!(
        resolver.resolve_group("10.1/x"),
        Err(MergeError::GroupNotFound { .. })
    ));
    assert_eq!(outgoing(&store, "Product", "B"), before);
}

#[test]
fn test_self_merge_is_rejected() {
    let store = loaded(&[product("A", None, "10.1/X")]);
    let result = store.write(|txn| merge_duplicate(txn, "A", "A", &MergePolicy::default()));
    assert!(matches!(result, Err(MergeError::SelfMerge { .. })));
    assert!(exists(&store, "Product", "A"));
}

#[test]
fn test_failure_mid_transaction_restores_the_group() {
    let store = loaded(&[product("A", Some("ebrains"), "10.1/X"), product("B", None, "10.1/X")]);
    let counts = store.read(|db| (db.node_count(), db.edge_count()));
    let policy = MergePolicy::default();

    let result = store.write(|txn| -> Result<()> {
        merge_duplicate(txn, "B", "A", &policy)?;
        merge_duplicate(txn, "B", "missing", &policy)?;
        Ok(())
    });

    assert!(matches!(result, Err(MergeError::DuplicateNotFound { .. })));
    assert!(exists(&store, "Product", "A"));
    assert_eq!(store.read(|db| (db.node_count(), db.edge_count())), counts);
}

#[test]
fn test_resolve_all_reports_groups_without_survivor() {
    let store = loaded(&[
        product("A", Some("ebrains"), "10.1/X"),
        product("B", Some("ebrains"), "10.1/X"),
        product("C", Some("ebrains"), "10.2/Y"),
        product("D", None, "10.2/Y"),
    ]);

    let report = DuplicateResolver::new(store.clone()).resolve_all();

    assert_eq!(report.groups, 2);
    assert_eq!(report.resolved.len(), 1);
    assert_eq!(report.resolved[0].doi, "10.2/y");
    assert_eq!(report.merged_products(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "10.1/x");
    assert!(matches!(report.failed[0].1, MergeError::NoSurvivor { .. }));

    assert!(exists(&store, "Product", "A"));
    assert!(exists(&store, "Product", "B"));
    assert!(!exists(&store, "Product", "C"));
}

// ============================================================================
// Loading
// ============================================================================

fn load_fixture() -> Vec<(EntityKind, Value)> {
    vec![
        (EntityKind::Agent, json!({"local_identifier": "agent_1", "name": "Ada"})),
        (
            EntityKind::Product,
            json!({
                "local_identifier": "P1",
                "titles": {"en": ["Deep sea"]},
                "identifiers": [{"scheme": "doi", "value": "10.5/ABC"}],
                "contributions": [{"by": "agent_1", "role": "author"}],
                "topics": [{"term": "t_missing"}],
                "manifestations": [{
                    "biblio": {"hosting_data_source": "ds_missing"},
                    "identifiers": [{"scheme": "url", "value": "u1"}],
                }],
                "related_products": {"cites": ["P2"]},
            }),
        ),
    ]
}

#[test]
fn test_loader_resolves_endpoints_by_relation_type() {
    let store = GraphStore::default();
    let report = GraphLoader::new(store.clone())
        .load(&decompositions(&load_fixture()))
        .unwrap();

    assert_eq!(report.nodes, 2);
    assert_eq!(report.identifiers, 2);
    assert_eq!(report.manifestations, 1);
    assert_eq!(report.skipped_edges, 2);
    assert_eq!(report.materialized, 1);

    store.read(|db| {
        let p1 = db.node_id("Product", "P1").unwrap();
        let agent = db.node_id("Agent", "agent_1").unwrap();
        let contributed = db.find_edge(agent, "HAS_CONTRIBUTED_TO", p1).unwrap();
        assert_eq!(contributed.props.get("role"), Some(&json!("author")));

        let manifestation = db.node_id("Manifestation", "P1:manifestation:0").unwrap();
        let url = db.node_id("Pid", "url:u1").unwrap();
        assert!(db.find_edge(manifestation, "HAS_PID", url).is_some());

        let p2 = db.node_id("Product", "P2").unwrap();
        assert!(db.find_edge(p1, "CITES", p2).is_some());
        assert_eq!(db.node(p2).unwrap().props.get(EXTERNAL), Some(&json!(true)));
        assert_eq!(db.node(p1).unwrap().props.get(EXTERNAL), None);

        let node = db.node(p1).unwrap();
        assert_eq!(node.prop_str("title_en"), Some("Deep sea"));
        assert!(node.prop_str("_data").is_some());
    });
}

#[test]
fn test_loading_twice_changes_nothing() {
    let store = GraphStore::default();
    let loader = GraphLoader::new(store.clone());
    let rows = decompositions(&load_fixture());

    loader.load(&rows).unwrap();
    let counts = store.read(|db| (db.node_count(), db.edge_count()));
    let edges = outgoing(&store, "Product", "P1");

    let second = loader.load(&rows).unwrap();
    assert_eq!(second.materialized, 0);
    assert_eq!(store.read(|db| (db.node_count(), db.edge_count())), counts);
    assert_eq!(outgoing(&store, "Product", "P1"), edges);
}

#[test]
fn test_loading_the_external_product_clears_its_marker() {
    let store = GraphStore::default();
    let loader = GraphLoader::new(store.clone());
    loader.load(&decompositions(&load_fixture())).unwrap();
    let marker = |store: &GraphStore| {
        store.read(|db| {
            let p2 = db.node_id("Product", "P2").unwrap();
            db.node(p2).unwrap().props.get(EXTERNAL).cloned()
        })
    };
    assert_eq!(marker(&store), Some(json!(true)));

    let real = json!({"local_identifier": "P2", "product_type": "dataset"});
    let report = loader
        .load(&decompositions(&[(EntityKind::Product, real)]))
        .unwrap();
    assert_eq!(marker(&store), None);
    assert_eq!(report.materialized, 0);

    store.read(|db| {
        let p2 = db.node(db.node_id("Product", "P2").unwrap()).unwrap();
        assert_eq!(p2.prop_str("product_type"), Some("dataset"));
        let p1 = db.node_id("Product", "P1").unwrap();
        assert!(db.find_edge(p1, "CITES", p2.id).is_some());
    });
}

#[test]
fn test_endpoint_labels_follow_the_source_family() {
    use skgraph_ingest::{EdgeType, RelationType};

    let (start, end) = endpoint_labels(EntityKind::Grant, &EdgeType::Fixed(RelationType::HasPid));
    assert_eq!(start, vec!["Grant", "Manifestation"]);
    assert_eq!(end, vec!["Pid"]);

    let (start, end) =
        endpoint_labels(EntityKind::Venue, &EdgeType::Fixed(RelationType::HasContributedTo));
    assert_eq!(start, vec!["Agent"]);
    assert_eq!(end, vec!["Venue"]);

    let (start, end) = endpoint_labels(EntityKind::Product, &EdgeType::related_product("isPartOf"));
    assert_eq!(start, vec!["Product"]);
    assert_eq!(end, vec!["Product"]);
}

#[test]
fn test_load_dir_reports_the_bad_row() {
    let dir = tempfile::tempdir().unwrap();
    let products = dir.path().join("to_load/products");
    std::fs::create_dir_all(&products).unwrap();
    std::fs::write(products.join("notes.txt"), "ignored").unwrap();
    std::fs::write(
        products.join("products.jsonl"),
        "{\"local_identifier\":\"P1\",\"entity_type\":\"product\",\"_data\":\"{}\"}\n\n{broken\n",
    )
    .unwrap();

    let store = GraphStore::default();
    match GraphLoader::new(store.clone()).load_dir(dir.path()) {
        Err(MergeError::Row { path, line, .. }) => {
            assert!(path.ends_with("products.jsonl"));
            assert_eq!(line, 3);
        }
        other => panic!("expected a row error, got {other:?}"),
    }
    assert_eq!(store.read(|db| db.node_count()), 0);
}

#[test]
fn test_load_dir_without_output_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let report = GraphLoader::new(GraphStore::default())
        .load_dir(dir.path())
        .unwrap();
    assert_eq!(report, LoadReport::default());
}
