use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Ingest Configuration
// ============================================================================

/// Configuration for a decomposition run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Directory containing `dump/<kind>/...`
    pub input_root: PathBuf,
    /// Directory receiving `to_load/<kind>/...`
    pub output_root: PathBuf,
    /// Key of the entity collection inside each dump line
    pub graph_key: String,
    /// File extensions treated as dump files
    pub input_extensions: Vec<String>,
    /// Record field naming the output space, if output is partitioned
    pub space_field: Option<String>,
    /// Decompose lines with rayon
    pub parallel: bool,
    /// Lines decomposed per parallel batch
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("."),
            output_root: PathBuf::from("."),
            graph_key: "@graph".to_string(),
            input_extensions: vec!["txt".to_string(), "jsonl".to_string(), "json".to_string()],
            space_field: None,
            parallel: true,
            batch_size: 1024,
        }
    }
}

impl IngestConfig {
    /// Read roots from `input_root` and write under `output_root`, defaults elsewhere.
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
            ..Self::default()
        }
    }

    /// Load from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
        serde_json::from_str(&text).map_err(|source| IngestError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub(crate) fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(false, |ext| self.input_extensions.iter().any(|x| x == ext))
    }
}
