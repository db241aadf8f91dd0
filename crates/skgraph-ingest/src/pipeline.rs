//! Line-delimited dump ingestion.
//!
//! Files under `<input_root>/dump/<kind-dir>` are read line by line. Each
//! batch of lines is decomposed in parallel (decomposition is pure), then
//! written in input order by the single owner of the [`PartitionRegistry`].
//! A malformed line is logged and counted; it never fails the run.

use crate::config::IngestConfig;
use crate::decompose::{decompose, Decomposition};
use crate::error::{IngestError, Result};
use crate::model::scalar_text;
use crate::partition::{with_registry, PartitionKey, PartitionRegistry};
use crate::schema::{EntityKind, EntitySchema};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub files: usize,
    /// Non-blank lines read.
    pub lines: u64,
    pub malformed_lines: u64,
    pub records: u64,
    /// Entities without a `local_identifier`.
    pub skipped: u64,
    /// Decomposed records per `entity_type`.
    pub entity_types: BTreeMap<String, u64>,
    /// Lines written per output file (relative to the output root).
    pub partitions: BTreeMap<String, u64>,
}

impl IngestReport {
    fn absorb(&mut self, other: LineOutcome) {
        match other {
            LineOutcome::Malformed => self.malformed_lines += 1,
            LineOutcome::Parsed { records, skipped } => {
                self.skipped += skipped;
                for (d, _) in &records {
                    self.records += 1;
                    *self.entity_types.entry(d.node.entity_type.clone()).or_default() += 1;
                }
            }
        }
    }

    fn set_partitions(&mut self, counts: BTreeMap<PartitionKey, u64>) {
        self.partitions = counts
            .into_iter()
            .map(|(key, lines)| (key.to_string(), lines))
            .collect();
    }
}

/// What one input line turned into.
enum LineOutcome {
    Malformed,
    Parsed {
        /// Decompositions with their (unsanitized) space.
        records: Vec<(Decomposition, Option<String>)>,
        skipped: u64,
    },
}

/// Drives decomposition of a dump directory into `to_load/`.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: IngestConfig,
}

impl Pipeline {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Decompose one entity family.
    pub fn run_kind(&self, kind: EntityKind) -> Result<IngestReport> {
        self.run(&[kind])
    }

    /// Decompose every family, referenced families first.
    pub fn run_all(&self) -> Result<IngestReport> {
        self.run(&EntityKind::ALL)
    }

    fn run(&self, kinds: &[EntityKind]) -> Result<IngestReport> {
        let (mut report, counts) = with_registry(&self.config.output_root, |registry| {
            let mut report = IngestReport::default();
            for &kind in kinds {
                self.ingest_kind(kind, registry, &mut report)?;
            }
            Ok(report)
        })?;
        report.set_partitions(counts);

        tracing::info!(
            files = report.files,
            lines = report.lines,
            malformed = report.malformed_lines,
            records = report.records,
            skipped = report.skipped,
            "ingest finished"
        );
        Ok(report)
    }

    /// Dump files for `kind`, in sorted path order. A missing directory
    /// yields no files.
    pub fn discover(&self, kind: EntityKind) -> Result<Vec<PathBuf>> {
        let root = self.config.input_root.join("dump").join(kind.input_dir());
        if !root.is_dir() {
            tracing::warn!(kind = ?kind, dir = %root.display(), "input directory not found");
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|source| IngestError::Walk {
                root: root.clone(),
                source,
            })?;
            if entry.file_type().is_file() && self.config.accepts(entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn ingest_kind(
        &self,
        kind: EntityKind,
        registry: &mut PartitionRegistry,
        report: &mut IngestReport,
    ) -> Result<()> {
        for path in self.discover(kind)? {
            self.ingest_file(&path, kind.schema(), registry, report)?;
            report.files += 1;
        }
        Ok(())
    }

    fn ingest_file(
        &self,
        path: &Path,
        schema: &EntitySchema,
        registry: &mut PartitionRegistry,
        report: &mut IngestReport,
    ) -> Result<()> {
        let file = File::open(path).map_err(|e| IngestError::io(path, e))?;
        let reader = BufReader::new(file);
        let batch_size = self.config.batch_size.max(1);

        let (lines, records, malformed) = (report.lines, report.records, report.malformed_lines);
        let mut batch: Vec<(usize, Vec<u8>)> = Vec::with_capacity(batch_size);

        for (index, line) in reader.split(b'\n').enumerate() {
            let line = line.map_err(|e| IngestError::io(path, e))?;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            batch.push((index + 1, line));
            if batch.len() == batch_size {
                self.flush_batch(path, schema, &mut batch, registry, report)?;
            }
        }
        self.flush_batch(path, schema, &mut batch, registry, report)?;

        tracing::info!(
            path = %path.display(),
            kind = ?schema.kind,
            lines = report.lines - lines,
            records = report.records - records,
            malformed = report.malformed_lines - malformed,
            "file ingested"
        );
        Ok(())
    }

    fn flush_batch(
        &self,
        path: &Path,
        schema: &EntitySchema,
        batch: &mut Vec<(usize, Vec<u8>)>,
        registry: &mut PartitionRegistry,
        report: &mut IngestReport,
    ) -> Result<()> {
        let decode = |(line_number, bytes): &(usize, Vec<u8>)| {
            self.decode_line(path, *line_number, bytes, schema)
        };
        let outcomes: Vec<LineOutcome> = if self.config.parallel {
            batch.par_iter().map(decode).collect()
        } else {
            batch.iter().map(decode).collect()
        };

        report.lines += batch.len() as u64;
        batch.clear();

        for outcome in outcomes {
            if let LineOutcome::Parsed { records, .. } = &outcome {
                for (d, space) in records {
                    registry.write_decomposition(d, space.as_deref())?;
                }
            }
            report.absorb(outcome);
        }
        Ok(())
    }

    fn decode_line(
        &self,
        path: &Path,
        line_number: usize,
        bytes: &[u8],
        schema: &EntitySchema,
    ) -> LineOutcome {
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_number,
                    error = %error,
                    "skipping malformed line"
                );
                return LineOutcome::Malformed;
            }
        };

        let mut records = Vec::new();
        let mut skipped = 0;
        for entity in graph_entities(&value, &self.config.graph_key) {
            match decompose(entity, schema) {
                Some(d) => {
                    let space = self
                        .config
                        .space_field
                        .as_deref()
                        .and_then(|field| entity.get(field))
                        .and_then(scalar_text);
                    records.push((d, space));
                }
                None => skipped += 1,
            }
        }
        LineOutcome::Parsed { records, skipped }
    }
}

/// The entity collection of one dump line: a list, or a single object as a
/// one-element list. Any other shape (or a missing key) yields nothing.
pub fn graph_entities<'a>(line: &'a Value, graph_key: &str) -> &'a [Value] {
    match line.get(graph_key) {
        Some(Value::Array(entities)) => entities,
        Some(single @ Value::Object(_)) => std::slice::from_ref(single),
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn graph_collection_shapes() {
        let list = json!({"@graph": [{"local_identifier": "a"}, {"local_identifier": "b"}]});
        assert_eq!(graph_entities(&list, "@graph").len(), 2);

        let single = json!({"@graph": {"local_identifier": "a"}});
        assert_eq!(graph_entities(&single, "@graph").len(), 1);

        assert!(graph_entities(&json!({"@graph": "nope"}), "@graph").is_empty());
        assert!(graph_entities(&json!({"other": []}), "@graph").is_empty());
        assert!(graph_entities(&json!([1, 2]), "@graph").is_empty());
    }
}
