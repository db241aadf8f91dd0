//! PathDB: in-memory labeled property graph for skgraph
//!
//! Holds the graph the decomposition output is loaded into, with the same
//! upsert contract a bulk loader gives a graph database:
//!
//! - nodes are keyed by `(label, local_identifier)`; merging a node replaces
//!   its properties (`SET n = props`)
//! - edges are keyed by `(start, type, end)`; merging an edge adds to its
//!   properties (`SET r += props`)
//!
//! Storage layout:
//! 1. **String Interning**: labels and edge types stored once, referenced by u32 ID
//! 2. **Bitmap Indexes**: label membership and adjacency as Roaring bitmaps
//! 3. **Tombstones**: deleted slots keep their ids, so an undo journal can
//!    restore a node or edge in place
//!
//! Mutation under concurrency goes through [`GraphStore`], which pairs a
//! `parking_lot` lock with per-transaction undo journals.

pub mod error;
pub mod txn;

pub use error::{GraphError, Result};
pub use txn::{GraphStore, Transaction};

use ahash::AHashMap;
use dashmap::DashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};

pub type NodeId = u32;
pub type EdgeId = u32;

/// JSON property map of a node or edge.
pub type Props = Map<String, Value>;

// ============================================================================
// String Interning (Compact String Storage)
// ============================================================================

/// Interned string ID (4 bytes instead of 24+ for String)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StrId(u32);

impl StrId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// String interner: maps strings to compact IDs
pub struct StringInterner {
    /// String to ID mapping
    str_to_id: DashMap<String, StrId>,
    /// ID to string mapping (for reverse lookup)
    id_to_str: DashMap<StrId, String>,
    /// Next available ID
    next_id: AtomicU32,
}

impl StringInterner {
    pub fn new() -> Self {
        Self {
            str_to_id: DashMap::new(),
            id_to_str: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    /// Intern a string, returning its ID
    pub fn intern(&self, s: &str) -> StrId {
        if let Some(id) = self.str_to_id.get(s) {
            return *id;
        }

        let id = *self
            .str_to_id
            .entry(s.to_string())
            .or_insert_with(|| StrId(self.next_id.fetch_add(1, Ordering::SeqCst)));
        self.id_to_str.entry(id).or_insert_with(|| s.to_string());
        id
    }

    /// Look up an existing ID for a string without inserting.
    pub fn id_of(&self, s: &str) -> Option<StrId> {
        self.str_to_id.get(s).map(|id| *id)
    }

    /// Look up string by ID
    pub fn lookup(&self, id: StrId) -> Option<String> {
        self.id_to_str.get(&id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::SeqCst) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Node Storage
// ============================================================================

/// A node in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub label: StrId,
    pub local_identifier: String,
    pub props: Props,
}

/// Node with its label resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeView {
    pub id: NodeId,
    pub label: String,
    pub local_identifier: String,
    pub props: Props,
}

impl NodeView {
    /// String property, if present and a string.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(Value::as_str)
    }
}

/// Slot-based node storage with key and label indexes
#[derive(Debug, Default)]
pub struct NodeStore {
    /// node id -> node (None once deleted)
    slots: Vec<Option<Node>>,
    /// (label, local_identifier) -> node id
    key_index: AHashMap<(StrId, String), NodeId>,
    /// label -> bitmap of live node ids
    label_index: AHashMap<StrId, RoaringBitmap>,
    live: usize,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn insert(&mut self, label: StrId, local_identifier: &str, props: Props) -> NodeId {
        let id = self.slots.len() as NodeId;
        self.slots.push(None);
        self.place(Node {
            id,
            label,
            local_identifier: local_identifier.to_string(),
            props,
        });
        id
    }

    /// Put `node` into its own slot and index it.
    fn place(&mut self, node: Node) {
        let id = node.id;
        self.key_index
            .insert((node.label, node.local_identifier.clone()), id);
        self.label_index.entry(node.label).or_default().insert(id);
        if let Some(slot) = self.slots.get_mut(id as usize) {
            *slot = Some(node);
            self.live += 1;
        }
    }

    fn remove(&mut self, id: NodeId) -> Option<Node> {
        let node = self.slots.get_mut(id as usize)?.take()?;
        self.key_index
            .remove(&(node.label, node.local_identifier.clone()));
        if let Some(ids) = self.label_index.get_mut(&node.label) {
            ids.remove(id);
        }
        self.live -= 1;
        Some(node)
    }

    /// Drop the most recently allocated slot (undo of an insert).
    fn discard_last(&mut self, id: NodeId) {
        self.remove(id);
        if self.slots.len() == id as usize + 1 {
            self.slots.pop();
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id as usize)?.as_ref()
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id as usize)?.as_mut()
    }

    pub fn lookup(&self, label: StrId, local_identifier: &str) -> Option<NodeId> {
        self.key_index
            .get(&(label, local_identifier.to_string()))
            .copied()
    }

    pub fn by_label(&self, label: StrId) -> Option<&RoaringBitmap> {
        self.label_index.get(&label)
    }
}

// ============================================================================
// Edge Storage (Edge-List with Indexes)
// ============================================================================

/// An edge in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub edge_type: StrId,
    pub start: NodeId,
    pub end: NodeId,
    pub props: Props,
}

/// Edge with its type resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeView {
    pub id: EdgeId,
    pub edge_type: String,
    pub start: NodeId,
    pub end: NodeId,
    pub props: Props,
}

/// Indexed edge storage
#[derive(Debug, Default)]
pub struct EdgeStore {
    /// edge id -> edge (None once deleted)
    slots: Vec<Option<Edge>>,
    /// (start, type, end) -> edge id
    key_index: AHashMap<(NodeId, StrId, NodeId), EdgeId>,
    /// Forward index: start -> edge ids
    outgoing: AHashMap<NodeId, RoaringBitmap>,
    /// Backward index: end -> edge ids
    incoming: AHashMap<NodeId, RoaringBitmap>,
    live: usize,
}

impl EdgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live edges.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn insert(&mut self, start: NodeId, edge_type: StrId, end: NodeId, props: Props) -> EdgeId {
        let id = self.slots.len() as EdgeId;
        self.slots.push(None);
        self.place(Edge {
            id,
            edge_type,
            start,
            end,
            props,
        });
        id
    }

    fn place(&mut self, edge: Edge) {
        let id = edge.id;
        self.key_index.insert((edge.start, edge.edge_type, edge.end), id);
        self.outgoing.entry(edge.start).or_default().insert(id);
        self.incoming.entry(edge.end).or_default().insert(id);
        if let Some(slot) = self.slots.get_mut(id as usize) {
            *slot = Some(edge);
            self.live += 1;
        }
    }

    fn remove(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.slots.get_mut(id as usize)?.take()?;
        self.key_index.remove(&(edge.start, edge.edge_type, edge.end));
        if let Some(ids) = self.outgoing.get_mut(&edge.start) {
            ids.remove(id);
        }
        if let Some(ids) = self.incoming.get_mut(&edge.end) {
            ids.remove(id);
        }
        self.live -= 1;
        Some(edge)
    }

    fn discard_last(&mut self, id: EdgeId) {
        self.remove(id);
        if self.slots.len() == id as usize + 1 {
            self.slots.pop();
        }
    }

    pub fn get(&self, id: EdgeId) -> Option<&Edge> {
        self.slots.get(id as usize)?.as_ref()
    }

    fn get_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.slots.get_mut(id as usize)?.as_mut()
    }

    pub fn lookup(&self, start: NodeId, edge_type: StrId, end: NodeId) -> Option<EdgeId> {
        self.key_index.get(&(start, edge_type, end)).copied()
    }

    /// Ids of edges leaving `node`.
    pub fn outgoing_ids(&self, node: NodeId) -> RoaringBitmap {
        self.outgoing.get(&node).cloned().unwrap_or_default()
    }

    /// Ids of edges entering `node`.
    pub fn incoming_ids(&self, node: NodeId) -> RoaringBitmap {
        self.incoming.get(&node).cloned().unwrap_or_default()
    }
}

// ============================================================================
// PathDB: The Complete Database
// ============================================================================

/// What a single mutation replaced; the transaction journal keeps these.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    NodeCreated(NodeId),
    NodeReplaced { id: NodeId, previous: Props },
    NodeDeleted(Node),
    EdgeCreated(EdgeId),
    EdgeReplaced { id: EdgeId, previous: Props },
    EdgeDeleted(Edge),
}

/// PathDB: labeled property graph
#[derive(Default)]
pub struct PathDB {
    /// String interner for labels and edge types
    pub interner: StringInterner,
    pub nodes: NodeStore,
    pub edges: EdgeStore,
}

impl PathDB {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Mutations
    // ========================================================================
    //
    // Every mutation returns the `Change`s needed to undo it, newest last.

    /// `MERGE (n:label {local_identifier}) SET n = props`.
    pub fn merge_node(
        &mut self,
        label: &str,
        local_identifier: &str,
        props: Props,
    ) -> (NodeId, Change) {
        let label_id = self.interner.intern(label);
        match self.nodes.lookup(label_id, local_identifier) {
            Some(id) => {
                let previous = match self.nodes.get_mut(id) {
                    Some(node) => std::mem::replace(&mut node.props, props),
                    None => Props::new(),
                };
                (id, Change::NodeReplaced { id, previous })
            }
            None => {
                let id = self.nodes.insert(label_id, local_identifier, props);
                (id, Change::NodeCreated(id))
            }
        }
    }

    /// `MERGE (n:label {local_identifier})` without touching properties.
    pub fn ensure_node(&mut self, label: &str, local_identifier: &str) -> (NodeId, Option<Change>) {
        let label_id = self.interner.intern(label);
        match self.nodes.lookup(label_id, local_identifier) {
            Some(id) => (id, None),
            None => {
                let id = self.nodes.insert(label_id, local_identifier, Props::new());
                (id, Some(Change::NodeCreated(id)))
            }
        }
    }

    /// `MERGE (a)-[r:edge_type]->(b) SET r += props`.
    pub fn merge_edge(
        &mut self,
        start: NodeId,
        edge_type: &str,
        end: NodeId,
        props: Props,
    ) -> Result<(EdgeId, Change)> {
        for id in [start, end] {
            if self.nodes.get(id).is_none() {
                return Err(GraphError::NodeNotFound(id));
            }
        }

        let type_id = self.interner.intern(edge_type);
        match self.edges.lookup(start, type_id, end) {
            Some(id) => {
                let edge = self.edges.get_mut(id).ok_or(GraphError::EdgeNotFound(id))?;
                let previous = edge.props.clone();
                edge.props.extend(props);
                Ok((id, Change::EdgeReplaced { id, previous }))
            }
            None => {
                let id = self.edges.insert(start, type_id, end, props);
                Ok((id, Change::EdgeCreated(id)))
            }
        }
    }

    /// `DETACH DELETE n`: the node's edges first, then the node.
    pub fn detach_delete(&mut self, id: NodeId) -> Result<Vec<Change>> {
        if self.nodes.get(id).is_none() {
            return Err(GraphError::NodeNotFound(id));
        }

        let mut changes = Vec::new();
        let attached = self.edges.outgoing_ids(id) | self.edges.incoming_ids(id);
        for edge_id in &attached {
            if let Some(edge) = self.edges.remove(edge_id) {
                changes.push(Change::EdgeDeleted(edge));
            }
        }
        if let Some(node) = self.nodes.remove(id) {
            changes.push(Change::NodeDeleted(node));
        }
        Ok(changes)
    }

    /// Reverse one change. Changes must be reverted newest first.
    pub fn revert(&mut self, change: Change) {
        match change {
            Change::NodeCreated(id) => self.nodes.discard_last(id),
            Change::NodeReplaced { id, previous } => {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.props = previous;
                }
            }
            Change::NodeDeleted(node) => self.nodes.place(node),
            Change::EdgeCreated(id) => self.edges.discard_last(id),
            Change::EdgeReplaced { id, previous } => {
                if let Some(edge) = self.edges.get_mut(id) {
                    edge.props = previous;
                }
            }
            Change::EdgeDeleted(edge) => self.edges.place(edge),
        }
    }

    // ========================================================================
    // Query Operations
    // ========================================================================

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Find a node by its key.
    pub fn node_id(&self, label: &str, local_identifier: &str) -> Option<NodeId> {
        let label_id = self.interner.id_of(label)?;
        self.nodes.lookup(label_id, local_identifier)
    }

    /// Like [`PathDB::node_id`], as an error when absent.
    pub fn require_node(&self, label: &str, local_identifier: &str) -> Result<NodeId> {
        self.node_id(label, local_identifier)
            .ok_or_else(|| GraphError::NodeKeyNotFound {
                label: label.to_string(),
                local_identifier: local_identifier.to_string(),
            })
    }

    /// Resolve a node into human-readable strings.
    pub fn node(&self, id: NodeId) -> Option<NodeView> {
        let node = self.nodes.get(id)?;
        Some(NodeView {
            id,
            label: self.interner.lookup(node.label)?,
            local_identifier: node.local_identifier.clone(),
            props: node.props.clone(),
        })
    }

    pub fn has_label(&self, id: NodeId, label: &str) -> bool {
        match (self.nodes.get(id), self.interner.id_of(label)) {
            (Some(node), Some(label_id)) => node.label == label_id,
            _ => false,
        }
    }

    /// Live nodes carrying `label` (bitmap result for efficient joins).
    pub fn nodes_with_label(&self, label: &str) -> RoaringBitmap {
        self.interner
            .id_of(label)
            .and_then(|id| self.nodes.by_label(id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn edge(&self, id: EdgeId) -> Option<EdgeView> {
        let edge = self.edges.get(id)?;
        Some(EdgeView {
            id,
            edge_type: self.interner.lookup(edge.edge_type)?,
            start: edge.start,
            end: edge.end,
            props: edge.props.clone(),
        })
    }

    /// The edge `(start)-[edge_type]->(end)`, if present.
    pub fn find_edge(&self, start: NodeId, edge_type: &str, end: NodeId) -> Option<EdgeView> {
        let type_id = self.interner.id_of(edge_type)?;
        self.edge(self.edges.lookup(start, type_id, end)?)
    }

    /// Edges leaving `node`, optionally restricted to one type.
    pub fn outgoing(&self, node: NodeId, edge_type: Option<&str>) -> Vec<EdgeView> {
        self.edge_views(&self.edges.outgoing_ids(node), edge_type)
    }

    /// Edges entering `node`, optionally restricted to one type.
    pub fn incoming(&self, node: NodeId, edge_type: Option<&str>) -> Vec<EdgeView> {
        self.edge_views(&self.edges.incoming_ids(node), edge_type)
    }

    /// Nodes adjacent to `node` in either direction.
    pub fn neighbors(&self, node: NodeId) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        for id in &(self.edges.outgoing_ids(node) | self.edges.incoming_ids(node)) {
            if let Some(edge) = self.edges.get(id) {
                out.insert(if edge.start == node { edge.end } else { edge.start });
            }
        }
        out
    }

    /// Neighbors of `node` carrying `label`.
    pub fn neighbors_with_label(&self, node: NodeId, label: &str) -> RoaringBitmap {
        self.neighbors(node) & self.nodes_with_label(label)
    }

    fn edge_views(&self, ids: &RoaringBitmap, edge_type: Option<&str>) -> Vec<EdgeView> {
        let type_filter = match edge_type {
            Some(name) => match self.interner.id_of(name) {
                Some(id) => Some(id),
                None => return Vec::new(),
            },
            None => None,
        };
        ids.iter()
            .filter_map(|id| self.edges.get(id))
            .filter(|edge| type_filter.map_or(true, |t| edge.edge_type == t))
            .filter_map(|edge| self.edge(edge.id))
            .collect()
    }
}
