//! SKG-IF dump decomposition for skgraph
//!
//! Turns nested per-entity dump records (agents, grants, venues, topics,
//! datasources, products) into flat, bulk-loadable graph rows:
//! - one node per entity, with a normalized `_data` provenance copy
//! - `Pid` identifier nodes plus `HAS_PID` edges
//! - typed relationship edges to other entity families
//! - for products, manifestation nodes and flattened bibliometric measures
//!
//! ```text
//!   dump line ──► normalize ──► decompose(schema) ──► Decomposition
//!                                   │                     │
//!                                   ├─ manifestations     ├─ node
//!                                   └─ ra_metrics         ├─ identifiers
//!                                                         ├─ manifestations
//!                                                         └─ relationships
//!                                                               │
//!                                          PartitionRegistry ◄──┘
//! ```
//!
//! Decomposition is pure: every id it emits is a function of the input
//! record, so re-ingesting the same dump produces byte-identical rows and
//! MERGE-style loaders stay idempotent.

pub mod config;
pub mod decompose;
pub mod error;
pub mod manifestation;
pub mod metrics;
pub mod model;
pub mod multilingual;
pub mod normalize;
pub mod partition;
pub mod pipeline;
pub mod schema;

pub use config::IngestConfig;
pub use decompose::{decompose, Decomposition};
pub use error::{IngestError, Result};
pub use model::{
    camel_to_upper_snake, EdgeType, EntityNode, IdentifierNode, ManifestationNode,
    RelationType, RelationshipEdge, MANIFESTATION_LABEL, PID_LABEL, RELATED_PRODUCT,
};
pub use multilingual::add_multilingual_fields;
pub use normalize::{clean_empty, clean_object};
pub use partition::{with_registry, Collection, PartitionKey, PartitionRegistry};
pub use pipeline::{IngestReport, Pipeline};
pub use schema::{EntityKind, EntitySchema};
