//! skgraph Graph Loading and Duplicate Resolution
//!
//! Takes decomposition output into a live [`GraphStore`] and folds
//! duplicate products (same DOI, tagged by a secondary source) into one
//! survivor:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      LOAD AND RESOLVE                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌───────────┐     ┌───────────────┐     ┌─────────────────┐       │
//! │  │ to_load/  │────►│  GraphLoader  │────►│   GraphStore    │       │
//! │  │  *.jsonl  │     │ (MERGE nodes, │     │ (PathDB behind  │       │
//! │  └───────────┘     │  then edges)  │     │   a RwLock)     │       │
//! │                    └───────────────┘     └────────┬────────┘       │
//! │                                                   │                 │
//! │                                                   ▼                 │
//! │                                         ┌──────────────────┐       │
//! │                                         │ DuplicateResolver│       │
//! │                                         │ one txn per DOI  │       │
//! │                                         └──────────────────┘       │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Properties
//!
//! - **Idempotent load**: nodes upsert by `(label, local_identifier)`,
//!   edges by `(start, type, end)`
//! - **Atomic groups**: a group merges completely or not at all
//! - **No guessing**: a group without an untagged product is reported,
//!   never resolved

pub mod error;
pub mod load;
pub mod resolve;

#[cfg(test)]
mod tests;

pub use error::{MergeError, Result};
pub use load::{endpoint_labels, GraphLoader, LoadReport, EXTERNAL};
pub use resolve::{
    find_duplicate_groups, merge_duplicate, select_survivor, DuplicateGroup, DuplicateResolver,
    GroupOutcome, MergeOutcome, MergePolicy, ProductRef, ResolveReport,
};
pub use skgraph_pathdb::GraphStore;
