use crate::{EdgeId, NodeId};

/// Errors raised by graph mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("unknown node id {0}")]
    NodeNotFound(NodeId),

    #[error("unknown edge id {0}")]
    EdgeNotFound(EdgeId),

    #[error("no {label} node with local_identifier `{local_identifier}`")]
    NodeKeyNotFound {
        label: String,
        local_identifier: String,
    },
}

pub type Result<T> = std::result::Result<T, GraphError>;
