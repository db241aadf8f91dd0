//! Write transactions over a shared [`PathDB`].
//!
//! ```text
//!   GraphStore::write(|txn| ...)
//!        │  exclusive lock held for the whole closure
//!        ▼
//!   Transaction ── merge_node / merge_edge / detach_delete ──► PathDB
//!        │                                                      │
//!        └──────────── undo journal (Change, newest last) ◄─────┘
//!
//!   Ok(_)  → journal discarded (commit)
//!   Err(_) → journal replayed in reverse (rollback)
//! ```
//!
//! A transaction that is dropped without committing (including by a panic
//! unwinding through the closure) rolls back as well.

use crate::{Change, EdgeId, NodeId, PathDB, Props, Result};
use parking_lot::RwLock;
use std::ops::Deref;
use std::sync::Arc;

/// Mutable access to a [`PathDB`] with an undo journal.
pub struct Transaction<'db> {
    db: &'db mut PathDB,
    journal: Vec<Change>,
    committed: bool,
}

impl<'db> Transaction<'db> {
    pub fn begin(db: &'db mut PathDB) -> Self {
        Self {
            db,
            journal: Vec::new(),
            committed: false,
        }
    }

    pub fn merge_node(&mut self, label: &str, local_identifier: &str, props: Props) -> NodeId {
        let (id, change) = self.db.merge_node(label, local_identifier, props);
        self.journal.push(change);
        id
    }

    pub fn ensure_node(&mut self, label: &str, local_identifier: &str) -> NodeId {
        let (id, change) = self.db.ensure_node(label, local_identifier);
        self.journal.extend(change);
        id
    }

    pub fn merge_edge(
        &mut self,
        start: NodeId,
        edge_type: &str,
        end: NodeId,
        props: Props,
    ) -> Result<EdgeId> {
        let (id, change) = self.db.merge_edge(start, edge_type, end, props)?;
        self.journal.push(change);
        Ok(id)
    }

    /// Delete `node` and its edges; returns how many edges went with it.
    pub fn detach_delete(&mut self, node: NodeId) -> Result<usize> {
        let changes = self.db.detach_delete(node)?;
        let edges = changes
            .iter()
            .filter(|c| matches!(c, Change::EdgeDeleted(_)))
            .count();
        self.journal.extend(changes);
        Ok(edges)
    }

    /// Mutations recorded so far.
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    pub fn commit(mut self) {
        self.committed = true;
        self.journal.clear();
    }

    pub fn rollback(mut self) {
        self.undo_all();
    }

    fn undo_all(&mut self) {
        let undone = self.journal.len();
        while let Some(change) = self.journal.pop() {
            self.db.revert(change);
        }
        if undone > 0 {
            tracing::debug!(changes = undone, "transaction rolled back");
        }
    }
}

impl Deref for Transaction<'_> {
    type Target = PathDB;

    fn deref(&self) -> &PathDB {
        &*self.db
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.undo_all();
        }
    }
}

// ============================================================================
// Shared store handle
// ============================================================================

/// A cloneable handle to one [`PathDB`] shared between readers and writers.
///
/// Writers are serialized: a write closure holds the lock exclusively from
/// its first read to its commit, so nothing else can change the graph
/// between what it reads and what it writes.
#[derive(Clone, Default)]
pub struct GraphStore {
    inner: Arc<RwLock<PathDB>>,
}

impl GraphStore {
    pub fn new(db: PathDB) -> Self {
        Self {
            inner: Arc::new(RwLock::new(db)),
        }
    }

    /// Shared read access.
    pub fn read<R>(&self, f: impl FnOnce(&PathDB) -> R) -> R {
        let guard = self.inner.read();
        f(&guard)
    }

    /// Run `f` as one transaction: `Ok` commits, `Err` rolls back every
    /// mutation `f` made.
    pub fn write<T, E>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let mut guard = self.inner.write();
        let mut txn = Transaction::begin(&mut guard);
        match f(&mut txn) {
            Ok(value) => {
                txn.commit();
                Ok(value)
            }
            Err(error) => {
                txn.rollback();
                Err(error)
            }
        }
    }
}

impl From<PathDB> for GraphStore {
    fn from(db: PathDB) -> Self {
        Self::new(db)
    }
}
