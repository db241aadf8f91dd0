//! Reference bulk loader for decomposition output.
//!
//! Mirrors what a graph database loader does with the `to_load/` files:
//!
//! - `MERGE (n:<Label> {local_identifier}) SET n = row` for entity,
//!   identifier (`Pid`) and manifestation rows
//! - `MATCH` both endpoints, then `MERGE (a)-[r:<type>]->(b) SET r += props`
//!   for relationship rows
//!
//! Related-product edges are the exception: their target `Product` is
//! `MERGE`d into existence with `external: true`, since it may belong to a
//! later dump. Loading the real row later replaces the marker.

use crate::error::{MergeError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use skgraph_ingest::{
    Collection, Decomposition, EdgeType, EntityKind, EntityNode, IdentifierNode,
    ManifestationNode, RelationType, RelationshipEdge, MANIFESTATION_LABEL, PID_LABEL,
};
use skgraph_pathdb::{GraphStore, NodeId, Props, Transaction};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Property set on products created only as related-product targets.
pub const EXTERNAL: &str = "external";

/// Counters for one load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub nodes: usize,
    pub identifiers: usize,
    pub manifestations: usize,
    pub edges: usize,
    /// Edges dropped because an endpoint was not in the graph.
    pub skipped_edges: usize,
    /// Related-product targets created by their edge.
    pub materialized: usize,
}

/// Rows to load, grouped so every node lands before any edge.
#[derive(Debug, Default)]
struct LoadBatch {
    nodes: Vec<(EntityKind, EntityNode)>,
    identifiers: Vec<IdentifierNode>,
    manifestations: Vec<ManifestationNode>,
    edges: Vec<(EntityKind, RelationshipEdge)>,
}

impl LoadBatch {
    fn push(&mut self, d: &Decomposition) {
        self.nodes.push((d.kind, d.node.clone()));
        self.identifiers.extend(d.identifiers.iter().cloned());
        self.manifestations.extend(d.manifestations.iter().cloned());
        self.edges
            .extend(d.relationships.iter().map(|e| (d.kind, e.clone())));
    }
}

/// Loads decomposition output into a [`GraphStore`].
#[derive(Clone)]
pub struct GraphLoader {
    store: GraphStore,
}

impl GraphLoader {
    pub fn new(store: GraphStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Load in-memory decompositions in one transaction.
    pub fn load(&self, decompositions: &[Decomposition]) -> Result<LoadReport> {
        let mut batch = LoadBatch::default();
        for d in decompositions {
            batch.push(d);
        }
        self.apply(batch)
    }

    /// Load every `to_load/` file under `output_root` in one transaction.
    pub fn load_dir(&self, output_root: &Path) -> Result<LoadReport> {
        let root = output_root.join("to_load");
        let mut batch = LoadBatch::default();

        for path in load_files(&root)? {
            let Some((kind, collection)) = classify(&path) else {
                tracing::debug!(path = %path.display(), "not a load file, ignored");
                continue;
            };
            match collection {
                Collection::Nodes => {
                    for node in read_rows::<EntityNode>(&path)? {
                        batch.nodes.push((kind, node));
                    }
                }
                Collection::Identifiers => batch.identifiers.extend(read_rows(&path)?),
                Collection::Manifestations => batch.manifestations.extend(read_rows(&path)?),
                Collection::Relationships => {
                    for edge in read_rows::<RelationshipEdge>(&path)? {
                        batch.edges.push((kind, edge));
                    }
                }
            }
        }
        self.apply(batch)
    }

    fn apply(&self, batch: LoadBatch) -> Result<LoadReport> {
        let report = self.store.write(|txn| -> Result<LoadReport> {
            let mut report = LoadReport::default();

            for (kind, node) in &batch.nodes {
                txn.merge_node(kind.label(), &node.local_identifier, to_props(node)?);
                report.nodes += 1;
            }
            for identifier in &batch.identifiers {
                txn.merge_node(PID_LABEL, &identifier.local_identifier, to_props(identifier)?);
                report.identifiers += 1;
            }
            for manifestation in &batch.manifestations {
                txn.merge_node(
                    MANIFESTATION_LABEL,
                    &manifestation.local_identifier,
                    to_props(manifestation)?,
                );
                report.manifestations += 1;
            }
            for (kind, edge) in &batch.edges {
                load_edge(txn, *kind, edge, &mut report)?;
            }
            Ok(report)
        })?;

        tracing::info!(
            nodes = report.nodes,
            identifiers = report.identifiers,
            manifestations = report.manifestations,
            edges = report.edges,
            skipped_edges = report.skipped_edges,
            "load committed"
        );
        Ok(report)
    }
}

fn load_edge(
    txn: &mut Transaction<'_>,
    kind: EntityKind,
    edge: &RelationshipEdge,
    report: &mut LoadReport,
) -> Result<()> {
    let (start_labels, end_labels) = endpoint_labels(kind, &edge.edge_type);

    let Some(start) = find_any(txn, &start_labels, &edge.start) else {
        return skip(edge, "start", report);
    };
    let end = match &edge.edge_type {
        EdgeType::Derived { .. } => match txn.node_id(EntityKind::Product.label(), &edge.end) {
            Some(id) => id,
            None => {
                let mut marker = Props::new();
                marker.insert(EXTERNAL.to_string(), Value::Bool(true));
                report.materialized += 1;
                txn.merge_node(EntityKind::Product.label(), &edge.end, marker)
            }
        },
        EdgeType::Fixed(_) => match find_any(txn, &end_labels, &edge.end) {
            Some(id) => id,
            None => return skip(edge, "end", report),
        },
    };

    let mut props = edge.properties.clone();
    if let Some(scheme) = &edge.scheme {
        props.insert("scheme".to_string(), Value::String(scheme.clone()));
    }
    txn.merge_edge(start, edge.edge_type.name(), end, props)?;
    report.edges += 1;
    Ok(())
}

fn skip(edge: &RelationshipEdge, missing: &str, report: &mut LoadReport) -> Result<()> {
    tracing::debug!(
        start = %edge.start,
        end = %edge.end,
        edge_type = edge.edge_type.name(),
        missing,
        "edge endpoint not loaded, edge skipped"
    );
    report.skipped_edges += 1;
    Ok(())
}

fn find_any(txn: &Transaction<'_>, labels: &[&str], local_identifier: &str) -> Option<NodeId> {
    labels
        .iter()
        .find_map(|label| txn.node_id(label, local_identifier))
}

/// Candidate labels for an edge's start and end, given the family whose
/// relationship file it came from.
pub fn endpoint_labels(kind: EntityKind, edge_type: &EdgeType) -> (Vec<&'static str>, Vec<&'static str>) {
    use EntityKind::*;
    use RelationType::*;

    let Some(fixed) = edge_type.fixed() else {
        return (vec![Product.label()], vec![Product.label()]);
    };
    match fixed {
        HasPid => (vec![kind.label(), MANIFESTATION_LABEL], vec![PID_LABEL]),
        AffiliatedWith => (vec![Agent.label()], vec![Agent.label()]),
        HasBeneficiary | HasFundingAgency => (vec![Grant.label()], vec![Agent.label()]),
        HasContributedTo => (vec![Agent.label()], vec![kind.label()]),
        HasTopic => (vec![Product.label()], vec![Topic.label()]),
        HasManifestation => (vec![Product.label()], vec![MANIFESTATION_LABEL]),
        HostedBy => (vec![MANIFESTATION_LABEL], vec![Datasource.label()]),
        PublishedIn => (vec![MANIFESTATION_LABEL], vec![Venue.label()]),
        IsRelevantTo => (vec![Product.label()], vec![Agent.label()]),
        FundedBy => (vec![Product.label()], vec![Grant.label()]),
    }
}

fn to_props<T: Serialize>(row: &T) -> Result<Props> {
    match serde_json::to_value(row).map_err(MergeError::Properties)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Props::new()),
    }
}

/// Every file under `root`, in sorted path order.
fn load_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| MergeError::Io {
            path: root.to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// `.../<kind-dir>/<file>.jsonl` → the kind and collection it holds.
fn classify(path: &Path) -> Option<(EntityKind, Collection)> {
    let dir = path.parent()?.file_name()?.to_str()?;
    let kind = EntityKind::ALL.into_iter().find(|k| k.output_dir() == dir)?;
    let name = path.file_name()?.to_str()?;
    [
        Collection::Nodes,
        Collection::Identifiers,
        Collection::Relationships,
        Collection::Manifestations,
    ]
    .into_iter()
    .find(|c| c.file_name(kind) == name)
    .map(|c| (kind, c))
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path).map_err(|source| MergeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rows = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| MergeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line).map_err(|source| MergeError::Row {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        rows.push(row);
    }
    Ok(rows)
}
