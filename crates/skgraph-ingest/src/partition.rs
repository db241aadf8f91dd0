//! Partition-writer registry.
//!
//! Every output file (one per entity kind, optional space, and collection)
//! has exactly one owning [`BufWriter`], opened the first time a row is
//! routed to it. The registry is the only owner: it is released by
//! [`PartitionRegistry::finish`], or flushed on drop when a run fails.

use crate::decompose::Decomposition;
use crate::error::{IngestError, Result};
use crate::normalize::clean_empty;
use crate::schema::EntityKind;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// The logical collections a decomposition is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Nodes,
    Identifiers,
    Relationships,
    Manifestations,
}

impl Collection {
    pub fn file_name(self, kind: EntityKind) -> String {
        match self {
            Self::Nodes => format!("{}.jsonl", kind.output_dir()),
            Self::Identifiers => "identifiers.jsonl".to_string(),
            Self::Relationships => "relationships.jsonl".to_string(),
            Self::Manifestations => "manifestations.jsonl".to_string(),
        }
    }
}

/// Identifies one output file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub kind: EntityKind,
    /// Sanitized space name, if output is split by space.
    pub space: Option<String>,
    pub collection: Collection,
}

impl PartitionKey {
    pub fn new(kind: EntityKind, space: Option<&str>, collection: Collection) -> Self {
        Self {
            kind,
            space: space.map(sanitize_space).filter(|s| !s.is_empty()),
            collection,
        }
    }

    /// Path below the output root:
    /// `to_load/[<space>/]<kind-dir>/<file>`.
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from("to_load");
        if let Some(space) = &self.space {
            path.push(space);
        }
        path.push(self.kind.output_dir());
        path.push(self.collection.file_name(self.kind));
        path
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path().display())
    }
}

/// File-system-safe space name: path separators, spaces and leading dots
/// become `_`, so a space never names `.`, `..` or a hidden directory.
pub fn sanitize_space(space: &str) -> String {
    let cleaned = space.trim().replace(['/', '\\', ' '], "_");
    let body = cleaned.trim_start_matches('.');
    format!("{}{body}", "_".repeat(cleaned.len() - body.len()))
}

struct Partition {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
}

/// Maps partition keys to their single owning writer.
pub struct PartitionRegistry {
    root: PathBuf,
    partitions: BTreeMap<PartitionKey, Partition>,
}

impl PartitionRegistry {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            root: output_root.into(),
            partitions: BTreeMap::new(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.root
    }

    /// Normalize `row` and append it as one JSON line to `key`'s file.
    pub fn write_row<T: Serialize>(&mut self, key: &PartitionKey, row: &T) -> Result<()> {
        let value = serde_json::to_value(row)
            .map_err(|source| IngestError::Serialize { what: "row", source })?;
        let line = serde_json::to_string(&clean_empty(value))
            .map_err(|source| IngestError::Serialize { what: "row", source })?;

        let partition = self.partition(key)?;
        writeln!(partition.writer, "{line}").map_err(|e| IngestError::io(&partition.path, e))?;
        partition.lines += 1;
        Ok(())
    }

    /// Write one decomposition: node, identifiers, manifestations, then
    /// relationships, so every synthesized id precedes the edges naming it.
    pub fn write_decomposition(&mut self, d: &Decomposition, space: Option<&str>) -> Result<()> {
        let key = |collection| PartitionKey::new(d.kind, space, collection);

        self.write_row(&key(Collection::Nodes), &d.node)?;

        let identifiers = key(Collection::Identifiers);
        for identifier in &d.identifiers {
            self.write_row(&identifiers, identifier)?;
        }

        let manifestations = key(Collection::Manifestations);
        for manifestation in &d.manifestations {
            self.write_row(&manifestations, manifestation)?;
        }

        let relationships = key(Collection::Relationships);
        for edge in &d.relationships {
            self.write_row(&relationships, edge)?;
        }
        Ok(())
    }

    /// Lines written so far, per partition.
    pub fn line_counts(&self) -> BTreeMap<PartitionKey, u64> {
        self.partitions
            .iter()
            .map(|(key, p)| (key.clone(), p.lines))
            .collect()
    }

    /// Flush and close every writer, returning the final line counts.
    pub fn finish(mut self) -> Result<BTreeMap<PartitionKey, u64>> {
        let counts = self.line_counts();
        for (key, mut partition) in std::mem::take(&mut self.partitions) {
            partition
                .writer
                .flush()
                .map_err(|e| IngestError::io(&partition.path, e))?;
            tracing::debug!(partition = %key, lines = partition.lines, "partition closed");
        }
        Ok(counts)
    }

    fn partition(&mut self, key: &PartitionKey) -> Result<&mut Partition> {
        match self.partitions.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self.root.join(key.relative_path());
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir).map_err(|e| IngestError::io(dir, e))?;
                }
                let file = File::create(&path).map_err(|e| IngestError::io(&path, e))?;
                tracing::debug!(path = %path.display(), "partition opened");
                Ok(entry.insert(Partition {
                    path,
                    writer: BufWriter::new(file),
                    lines: 0,
                }))
            }
        }
    }
}

impl Drop for PartitionRegistry {
    fn drop(&mut self) {
        for partition in self.partitions.values_mut() {
            if let Err(error) = partition.writer.flush() {
                tracing::warn!(
                    path = %partition.path.display(),
                    error = %error,
                    "failed to flush partition on release"
                );
            }
        }
    }
}

/// Run `f` with a fresh registry rooted at `output_root`.
///
/// On success the registry is finished and its line counts returned along
/// with `f`'s result; on error it is dropped (writers flushed best-effort)
/// and the error propagated.
pub fn with_registry<T>(
    output_root: impl Into<PathBuf>,
    f: impl FnOnce(&mut PartitionRegistry) -> Result<T>,
) -> Result<(T, BTreeMap<PartitionKey, u64>)> {
    let mut registry = PartitionRegistry::new(output_root);
    let value = f(&mut registry)?;
    let counts = registry.finish()?;
    Ok((value, counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose::decompose;
    use serde_json::{json, Value};

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn space_names_are_sanitized() {
        assert_eq!(sanitize_space("neuro/ebrains cancer\\x"), "neuro_ebrains_cancer_x");
        let key = PartitionKey::new(EntityKind::Product, Some("a b"), Collection::Nodes);
        assert_eq!(
            key.relative_path(),
            PathBuf::from("to_load/a_b/products/products.jsonl")
        );
        let unspaced = PartitionKey::new(EntityKind::Grant, Some("  "), Collection::Identifiers);
        assert_eq!(
            unspaced.relative_path(),
            PathBuf::from("to_load/grants/identifiers.jsonl")
        );
    }

    #[test]
    fn dot_spaces_stay_inside_their_own_directory() {
        assert_eq!(sanitize_space("."), "_");
        assert_eq!(sanitize_space(".."), "__");
        assert_eq!(sanitize_space("../x"), "___x");
        assert_eq!(sanitize_space(".hidden"), "_hidden");
        assert_eq!(sanitize_space("v1.2"), "v1.2");

        let dir = tempfile::tempdir().unwrap();
        let plain = PartitionKey::new(EntityKind::Product, None, Collection::Nodes);
        let dot = PartitionKey::new(EntityKind::Product, Some("."), Collection::Nodes);
        let parent = PartitionKey::new(EntityKind::Product, Some(".."), Collection::Nodes);

        let (_, counts) = with_registry(dir.path(), |r| {
            r.write_row(&plain, &json!({"local_identifier": "P1"}))?;
            r.write_row(&dot, &json!({"local_identifier": "P2"}))?;
            r.write_row(&parent, &json!({"local_identifier": "P3"}))?;
            r.write_row(&plain, &json!({"local_identifier": "P4"}))
        })
        .unwrap();

        assert_eq!(counts.len(), 3);
        let ids = |rel: &str| -> Vec<Value> {
            read_lines(&dir.path().join(rel))
                .into_iter()
                .map(|row| row["local_identifier"].clone())
                .collect()
        };
        assert_eq!(ids("to_load/products/products.jsonl"), vec![json!("P1"), json!("P4")]);
        assert_eq!(ids("to_load/_/products/products.jsonl"), vec![json!("P2")]);
        assert_eq!(ids("to_load/__/products/products.jsonl"), vec![json!("P3")]);
        assert!(!dir.path().join("products").exists());
    }

    #[test]
    fn rows_are_normalized_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let key = PartitionKey::new(EntityKind::Topic, None, Collection::Nodes);

        let (_, counts) = with_registry(dir.path(), |registry| {
            registry.write_row(&key, &json!({"local_identifier": "t1", "label": "", "x": [null]}))?;
            registry.write_row(&key, &json!({"local_identifier": "t2", "n": 0, "b": false}))
        })
        .unwrap();

        assert_eq!(counts.get(&key), Some(&2));
        let rows = read_lines(&dir.path().join("to_load/topics/topics.jsonl"));
        assert_eq!(
            rows,
            vec![
                json!({"local_identifier": "t1"}),
                json!({"local_identifier": "t2", "n": 0, "b": false}),
            ]
        );
    }

    #[test]
    fn decomposition_fans_out_to_collections() {
        let dir = tempfile::tempdir().unwrap();
        let record = json!({
            "local_identifier": "P1",
            "identifiers": [{"scheme": "doi", "value": "10.1/x"}],
            "manifestations": [{"version": "1"}],
        });
        let d = decompose(&record, EntityKind::Product.schema()).unwrap();

        let (_, counts) = with_registry(dir.path(), |r| r.write_decomposition(&d, None)).unwrap();
        assert_eq!(counts.len(), 4);

        let base = dir.path().join("to_load/products");
        assert_eq!(read_lines(&base.join("products.jsonl")).len(), 1);
        assert_eq!(read_lines(&base.join("identifiers.jsonl")).len(), 1);
        assert_eq!(read_lines(&base.join("manifestations.jsonl")).len(), 1);
        assert_eq!(read_lines(&base.join("relationships.jsonl")).len(), 2);
    }

    #[test]
    fn failed_scope_still_flushes_written_rows() {
        let dir = tempfile::tempdir().unwrap();
        let key = PartitionKey::new(EntityKind::Agent, None, Collection::Nodes);

        let result = with_registry(dir.path(), |registry| {
            registry.write_row(&key, &json!({"local_identifier": "a1"}))?;
            Err::<(), _>(IngestError::io("boom", std::io::ErrorKind::Other.into()))
        });

        assert!(result.is_err());
        let rows = read_lines(&dir.path().join("to_load/agents/agents.jsonl"));
        assert_eq!(rows, vec![json!({"local_identifier": "a1"})]);
    }
}
