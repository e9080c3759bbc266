use std::{collections::HashMap, path::Path};

use rayon::prelude::*;
use serde::Deserialize;
use tracing::info;

use crate::{
    chunk::{Chunk, ChunkMetadata},
    chunk_id::ChunkId,
    error::{Error, Result},
    store::ChunkStore,
};

/// One JSON Lines record as written by the ingestion pipeline.
#[derive(Debug, Deserialize)]
struct ChunkRecord {
    #[serde(default)]
    id: Option<String>,
    text: String,
    embedding: Vec<f32>,
    #[serde(default)]
    metadata: ChunkMetadata,
}

impl ChunkRecord {
    /// `position` is the record's 0-based index among non-blank lines.
    fn into_chunk(self, position: usize) -> Chunk {
        let id = match self.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => ChunkId::derive(
                self.metadata.source.as_deref(),
                self.metadata
                    .chunk_index
                    .map_or(position, |index| index as usize),
            )
            .into_string(),
        };
        Chunk {
            id,
            text: self.text,
            embedding: self.embedding,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub records: usize,
    pub inserted: usize,
    pub updated: usize,
}

/// Load chunk records from a JSON Lines file into `store`.
///
/// Every record is validated before anything is written: any malformed
/// record aborts the whole import with `InvalidInput` naming its line.
/// Embeddings must match `dimension` when given, else the store's
/// dimension, else the first record's length.
pub fn import_jsonl(
    path: &Path,
    store: &dyn ChunkStore,
    dimension: Option<usize>,
) -> Result<ImportReport> {
    let content = std::fs::read_to_string(path)?;
    let chunks = parse_records(&content)?;
    check_unique_ids(&chunks)?;

    let dimension = match (dimension, store.dimension()?) {
        (Some(expected), Some(stored)) if expected != stored => {
            return Err(Error::DimensionMismatch {
                expected: stored,
                actual: expected,
            });
        }
        (Some(d), _) | (None, Some(d)) => Some(d),
        (None, None) => chunks.first().map(|(_, c)| c.embedding.len()),
    };

    for (line, chunk) in &chunks {
        chunk
            .validate(dimension)
            .map_err(|e| Error::InvalidInput(format!("line {line}: {e}")))?;
    }

    let chunks: Vec<Chunk> = chunks.into_iter().map(|(_, c)| c).collect();
    let inserted = store.upsert(&chunks)?;
    let report = ImportReport {
        records: chunks.len(),
        inserted,
        updated: chunks.len() - inserted,
    };

    info!(
        path = %path.display(),
        records = report.records,
        inserted = report.inserted,
        updated = report.updated,
        "imported chunks"
    );
    Ok(report)
}

/// Two records sharing an id would silently overwrite each other.
fn check_unique_ids(chunks: &[(usize, Chunk)]) -> Result<()> {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    for (line, chunk) in chunks {
        if let Some(first) = first_seen.insert(&chunk.id, *line) {
            return Err(Error::InvalidInput(format!(
                "line {line}: duplicate chunk id {} \
                 (first seen on line {first})",
                chunk.id
            )));
        }
    }
    Ok(())
}

/// Parse non-blank lines in parallel, keeping 1-based line numbers.
fn parse_records(content: &str) -> Result<Vec<(usize, Chunk)>> {
    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i + 1, line))
        .collect();

    let parsed: Vec<Result<(usize, Chunk)>> = lines
        .par_iter()
        .enumerate()
        .map(|(position, (line_no, line))| {
            let record: ChunkRecord = serde_json::from_str(line).map_err(|e| {
                Error::InvalidInput(format!("line {line_no}: {e}"))
            })?;
            Ok((*line_no, record.into_chunk(position)))
        })
        .collect();

    parsed.into_iter().collect()
}
