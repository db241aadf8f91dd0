use skgraph_pathdb::GraphError;
use std::path::PathBuf;

/// Errors raised while loading or merging.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Every member of the group carries a source tag; nothing to keep.
    #[error("no product without a source tag in DOI group `{doi}`")]
    NoSurvivor { doi: String },

    #[error("no duplicate group for DOI `{doi}`")]
    GroupNotFound { doi: String },

    #[error("duplicate product `{local_identifier}` not found")]
    DuplicateNotFound { local_identifier: String },

    #[error("survivor product `{local_identifier}` not found")]
    SurvivorNotFound { local_identifier: String },

    #[error("product `{local_identifier}` cannot be merged into itself")]
    SelfMerge { local_identifier: String },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad row at {path}:{line}: {source}")]
    Row {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to convert row to properties: {0}")]
    Properties(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MergeError>;
