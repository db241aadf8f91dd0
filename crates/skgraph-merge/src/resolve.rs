//! DOI-keyed duplicate product resolution.
//!
//! ```text
//!   Product ─HAS_PID─► Pid{scheme: doi, value}      grouped by lower(value)
//!
//!   group (size > 1, ≥1 member tagged with the policy source)
//!     │
//!     ├─ select survivor: untagged members, smallest local_identifier
//!     │                   none → NoSurvivor (group left untouched)
//!     │
//!     └─ for each tagged duplicate:
//!          copy HAS_PID for schemes the survivor lacks
//!          remember non-Product neighbors
//!          DETACH DELETE duplicate
//!          DETACH DELETE remembered neighbors with no Product left
//! ```
//!
//! Each group resolves inside one [`GraphStore::write`] transaction, so a
//! failure anywhere in a group leaves that group exactly as it was.

use crate::error::{MergeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skgraph_pathdb::{GraphStore, NodeId, PathDB, Props, Transaction};
use std::collections::{BTreeMap, BTreeSet};

const HAS_PID: &str = "HAS_PID";

/// Which products and identifiers take part in resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicy {
    /// `Pid.scheme` that keys the groups.
    pub doi_scheme: String,
    /// `source` value marking products that may be merged away.
    pub source_tag: String,
    pub product_label: String,
    pub pid_label: String,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            doi_scheme: "doi".to_string(),
            source_tag: "ebrains".to_string(),
            product_label: "Product".to_string(),
            pid_label: "Pid".to_string(),
        }
    }
}

/// A product as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductRef {
    pub node: NodeId,
    pub local_identifier: String,
    /// `None` when the node has no `source` (or a null one).
    pub source: Option<String>,
}

impl ProductRef {
    fn from_props(node: NodeId, local_identifier: &str, props: &Props) -> Self {
        let source = match props.get("source") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        Self {
            node,
            local_identifier: local_identifier.to_string(),
            source,
        }
    }

    pub fn is_tagged(&self, tag: &str) -> bool {
        self.source.as_deref() == Some(tag)
    }
}

/// Products sharing one DOI. Members are sorted by `local_identifier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Lowercased DOI value.
    pub doi: String,
    pub members: Vec<ProductRef>,
}

impl DuplicateGroup {
    pub fn select_survivor(&self) -> Result<&ProductRef> {
        select_survivor(&self.doi, &self.members)
    }

    /// Members tagged with `tag`, other than `survivor`.
    pub fn duplicates<'a>(
        &'a self,
        survivor: &'a ProductRef,
        tag: &'a str,
    ) -> impl Iterator<Item = &'a ProductRef> + 'a {
        self.members
            .iter()
            .filter(move |m| m.node != survivor.node && m.is_tagged(tag))
    }
}

/// The untagged member with the smallest `local_identifier`.
pub fn select_survivor<'a>(doi: &str, members: &'a [ProductRef]) -> Result<&'a ProductRef> {
    members
        .iter()
        .filter(|m| m.source.is_none())
        .min_by(|a, b| a.local_identifier.cmp(&b.local_identifier))
        .ok_or_else(|| MergeError::NoSurvivor {
            doi: doi.to_string(),
        })
}

/// Every duplicate group in `db`, sorted by DOI.
pub fn find_duplicate_groups(db: &PathDB, policy: &MergePolicy) -> Vec<DuplicateGroup> {
    let mut by_doi: BTreeMap<String, BTreeMap<NodeId, ProductRef>> = BTreeMap::new();

    for pid in &db.nodes_with_label(&policy.pid_label) {
        let Some(pid_node) = db.node(pid) else { continue };
        if pid_node.prop_str("scheme") != Some(policy.doi_scheme.as_str()) {
            continue;
        }
        let Some(value) = pid_node.prop_str("value") else {
            continue;
        };
        let doi = value.to_lowercase();

        for edge in db.incoming(pid, Some(HAS_PID)) {
            if !db.has_label(edge.start, &policy.product_label) {
                continue;
            }
            if let Some(product) = db.node(edge.start) {
                by_doi.entry(doi.clone()).or_default().insert(
                    product.id,
                    ProductRef::from_props(product.id, &product.local_identifier, &product.props),
                );
            }
        }
    }

    by_doi
        .into_iter()
        .filter_map(|(doi, members)| {
            let mut members: Vec<ProductRef> = members.into_values().collect();
            if members.len() < 2 || !members.iter().any(|m| m.is_tagged(&policy.source_tag)) {
                return None;
            }
            members.sort_by(|a, b| a.local_identifier.cmp(&b.local_identifier));
            Some(DuplicateGroup { doi, members })
        })
        .collect()
}

/// What one duplicate merge changed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MergeOutcome {
    pub survivor: String,
    pub duplicate: String,
    /// `local_identifier`s of Pids newly linked to the survivor.
    pub copied_pids: Vec<String>,
    /// Edges removed with the duplicate.
    pub deleted_edges: usize,
    /// Former neighbors deleted because no Product pointed at them anymore.
    pub orphans_removed: usize,
}

/// Merge product `duplicate` into product `survivor` inside `txn`.
///
/// A duplicate that no longer exists is an error and leaves the graph
/// untouched, so merging twice never reaches the survivor.
pub fn merge_duplicate(
    txn: &mut Transaction<'_>,
    survivor: &str,
    duplicate: &str,
    policy: &MergePolicy,
) -> Result<MergeOutcome> {
    if survivor == duplicate {
        return Err(MergeError::SelfMerge {
            local_identifier: survivor.to_string(),
        });
    }
    let dup = txn
        .node_id(&policy.product_label, duplicate)
        .ok_or_else(|| MergeError::DuplicateNotFound {
            local_identifier: duplicate.to_string(),
        })?;
    let keep = txn
        .node_id(&policy.product_label, survivor)
        .ok_or_else(|| MergeError::SurvivorNotFound {
            local_identifier: survivor.to_string(),
        })?;

    let mut outcome = MergeOutcome {
        survivor: survivor.to_string(),
        duplicate: duplicate.to_string(),
        ..MergeOutcome::default()
    };

    // Schemes as they were before this merge; never overwritten.
    let held: BTreeSet<String> = pid_targets(&**txn, keep, policy)
        .into_iter()
        .map(|(_, scheme, _)| scheme)
        .collect();

    for (pid, scheme, local_identifier) in pid_targets(&**txn, dup, policy) {
        if held.contains(&scheme) {
            continue;
        }
        let mut props = Props::new();
        props.insert("scheme".to_string(), Value::String(scheme));
        txn.merge_edge(keep, HAS_PID, pid, props)?;
        outcome.copied_pids.push(local_identifier);
    }

    let neighbors: Vec<NodeId> =
        (txn.neighbors(dup) - txn.nodes_with_label(&policy.product_label))
            .into_iter()
            .collect();

    outcome.deleted_edges = txn.detach_delete(dup)?;

    for node in neighbors {
        if txn.node(node).is_none() {
            continue;
        }
        if txn.neighbors_with_label(node, &policy.product_label).is_empty() {
            txn.detach_delete(node)?;
            outcome.orphans_removed += 1;
        }
    }

    Ok(outcome)
}

/// `(node, scheme, local_identifier)` of every Pid `product` links to.
fn pid_targets(db: &PathDB, product: NodeId, policy: &MergePolicy) -> Vec<(NodeId, String, String)> {
    db.outgoing(product, Some(HAS_PID))
        .into_iter()
        .filter_map(|edge| {
            let pid = db.node(edge.end)?;
            if pid.label != policy.pid_label {
                return None;
            }
            let scheme = pid.prop_str("scheme")?.to_string();
            Some((pid.id, scheme, pid.local_identifier))
        })
        .collect()
}

/// One resolved group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOutcome {
    pub doi: String,
    pub survivor: String,
    pub merges: Vec<MergeOutcome>,
}

/// Result of [`DuplicateResolver::resolve_all`].
#[derive(Debug, Default)]
pub struct ResolveReport {
    /// Groups found before resolution started.
    pub groups: usize,
    pub resolved: Vec<GroupOutcome>,
    /// Groups left untouched, with why.
    pub failed: Vec<(String, MergeError)>,
}

impl ResolveReport {
    pub fn merged_products(&self) -> usize {
        self.resolved.iter().map(|g| g.merges.len()).sum()
    }
}

/// Resolves duplicate products in a shared graph.
#[derive(Clone)]
pub struct DuplicateResolver {
    store: GraphStore,
    policy: MergePolicy,
}

impl DuplicateResolver {
    pub fn new(store: GraphStore) -> Self {
        Self::with_policy(store, MergePolicy::default())
    }

    pub fn with_policy(store: GraphStore, policy: MergePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    pub fn groups(&self) -> Vec<DuplicateGroup> {
        self.store.read(|db| find_duplicate_groups(db, &self.policy))
    }

    /// Select and merge one group as a single transaction.
    ///
    /// The group is read again under the write lock: what was selected is
    /// exactly what gets merged.
    pub fn resolve_group(&self, doi: &str) -> Result<GroupOutcome> {
        let policy = &self.policy;
        let doi = doi.to_lowercase();

        self.store.write(|txn| -> Result<GroupOutcome> {
            let group = find_duplicate_groups(&**txn, policy)
                .into_iter()
                .find(|g| g.doi == doi)
                .ok_or_else(|| MergeError::GroupNotFound { doi: doi.clone() })?;
            let survivor = group.select_survivor()?;

            let mut merges = Vec::new();
            for duplicate in group.duplicates(survivor, &policy.source_tag) {
                let outcome = merge_duplicate(
                    txn,
                    &survivor.local_identifier,
                    &duplicate.local_identifier,
                    policy,
                )?;
                tracing::info!(
                    doi = %group.doi,
                    survivor = %outcome.survivor,
                    duplicate = %outcome.duplicate,
                    copied_pids = outcome.copied_pids.len(),
                    orphans_removed = outcome.orphans_removed,
                    "merged duplicate product"
                );
                merges.push(outcome);
            }

            Ok(GroupOutcome {
                doi: group.doi.clone(),
                survivor: survivor.local_identifier.clone(),
                merges,
            })
        })
    }

    /// Resolve every group, each in its own transaction.
    pub fn resolve_all(&self) -> ResolveReport {
        let groups = self.groups();
        let mut report = ResolveReport {
            groups: groups.len(),
            ..ResolveReport::default()
        };

        for group in groups {
            match self.resolve_group(&group.doi) {
                Ok(outcome) => report.resolved.push(outcome),
                Err(error) => {
                    match &error {
                        MergeError::NoSurvivor { .. } => {
                            tracing::error!(doi = %group.doi, %error, "group left unresolved")
                        }
                        _ => tracing::warn!(doi = %group.doi, %error, "group merge rolled back"),
                    }
                    report.failed.push((group.doi, error));
                }
            }
        }

        tracing::info!(
            groups = report.groups,
            resolved = report.resolved.len(),
            failed = report.failed.len(),
            merged = report.merged_products(),
            "duplicate resolution finished"
        );
        report
    }
}
