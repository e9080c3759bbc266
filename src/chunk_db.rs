use std::{collections::BTreeSet, path::Path};

use rayon::prelude::*;
use redb::{
    Database,
    MultimapTableDefinition,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
    backends::InMemoryBackend,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    chunk::{Chunk, ChunkMetadata},
    error::{Error, Result},
    resolver::{StructuralKind, leading_locator},
    store::{ChunkStore, ScoredChunk, cosine_distance},
};

/// seq -> chunk record (JSON, without the embedding).
const CHUNKS: TableDefinition<u64, &[u8]> = TableDefinition::new("chunks");
/// seq -> embedding as packed f32 values.
const EMBEDDINGS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("embeddings");
/// chunk id -> seq.
const CHUNK_IDS: TableDefinition<&str, u64> = TableDefinition::new("chunk_ids");
/// "field\x1fvalue" -> seqs carrying that structural label.
const LABELS: MultimapTableDefinition<&str, u64> =
    MultimapTableDefinition::new("labels");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const META_DIMENSION: &str = "dimension";
const META_NEXT_SEQ: &str = "next_seq";

/// The on-disk chunk record. The embedding lives in its own table so the
/// vector scan never decodes JSON.
#[derive(Serialize, Deserialize)]
struct StoredChunk {
    id: String,
    text: String,
    metadata: ChunkMetadata,
}

/// Embedded chunk store backed by redb.
///
/// Each chunk gets a monotonically increasing sequence number on first
/// insert; the sequence is its insertion position and survives upserts.
/// Structural labels are indexed for exact lookup, and vector queries run
/// a brute-force cosine scan over every stored embedding.
pub struct ChunkDb {
    db: Database,
}

impl ChunkDb {
    /// Open or create a chunk database at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use lexbert::{ChunkDb, ChunkStore};
    ///
    /// let db = ChunkDb::open(&tmp.path().join("chunks.redb")).unwrap();
    /// assert_eq!(db.count().unwrap(), 0);
    /// assert_eq!(db.dimension().unwrap(), None);
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Database::create(path)?)
    }

    /// A store that lives only as long as the value. Used in tests and for
    /// throwaway imports.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(
            Database::builder().create_with_backend(InMemoryBackend::new())?,
        )
    }

    fn init(db: Database) -> Result<Self> {
        let txn = db.begin_write()?;
        txn.open_table(CHUNKS)?;
        txn.open_table(EMBEDDINGS)?;
        txn.open_table(CHUNK_IDS)?;
        txn.open_multimap_table(LABELS)?;
        txn.open_table(META)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Look up a single chunk by id.
    pub fn get(&self, id: &str) -> Result<Option<Chunk>> {
        let txn = self.db.begin_read()?;
        let ids = txn.open_table(CHUNK_IDS)?;
        let Some(seq) = ids.get(id)?.map(|g| g.value()) else {
            return Ok(None);
        };
        let mut loaded = self.load(&txn, &[seq])?;
        Ok(loaded.pop())
    }

    /// Load the chunks at `seqs`, in order. Every seq must have both a
    /// record and an embedding; a gap means the database is inconsistent.
    fn load(
        &self,
        txn: &redb::ReadTransaction,
        seqs: &[u64],
    ) -> Result<Vec<Chunk>> {
        let chunks = txn.open_table(CHUNKS)?;
        let embeddings = txn.open_table(EMBEDDINGS)?;

        let mut out = Vec::with_capacity(seqs.len());
        for &seq in seqs {
            let Some(record) = chunks.get(seq)? else {
                return Err(Error::StoreUnavailable(format!(
                    "chunk record {seq} is missing"
                )));
            };
            let stored: StoredChunk = serde_json::from_slice(record.value())?;
            let Some(embedding) = embeddings.get(seq)? else {
                return Err(Error::StoreUnavailable(format!(
                    "embedding for chunk {} is missing",
                    stored.id
                )));
            };
            let embedding = decode_embedding(embedding.value())?;
            out.push(Chunk {
                id: stored.id,
                text: stored.text,
                embedding,
                metadata: stored.metadata,
            });
        }
        Ok(out)
    }
}

impl ChunkStore for ChunkDb {
    fn find_by_metadata(
        &self,
        kind: StructuralKind,
        values: &[String],
    ) -> Result<Vec<Chunk>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_read()?;
        let labels = txn.open_multimap_table(LABELS)?;

        // Sequence order is insertion order, and the set dedups chunks
        // matched by more than one variant.
        let mut seqs = BTreeSet::new();
        for value in values {
            for seq in labels.get(label_key(kind, value).as_str())? {
                seqs.insert(seq?.value());
            }
        }

        debug!(
            field = kind.field(),
            variants = values.len(),
            matches = seqs.len(),
            "metadata lookup"
        );

        let seqs: Vec<u64> = seqs.into_iter().collect();
        self.load(&txn, &seqs)
    }

    fn find_by_vector(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dimension()?
            && vector.len() != expected
        {
            return Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let txn = self.db.begin_read()?;
        let embeddings = txn.open_table(EMBEDDINGS)?;

        let mut stored = Vec::new();
        for entry in embeddings.iter()? {
            let (seq, bytes) = entry?;
            stored.push((seq.value(), decode_embedding(bytes.value())?));
        }

        let mut scored: Vec<(u64, f32)> = stored
            .par_iter()
            .map(|(seq, embedding)| (*seq, cosine_distance(vector, embedding)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        debug!(
            scanned = stored.len(),
            returned = scored.len(),
            "vector scan"
        );

        let seqs: Vec<u64> = scored.iter().map(|(seq, _)| *seq).collect();
        let chunks = self.load(&txn, &seqs)?;
        Ok(chunks
            .into_iter()
            .zip(scored)
            .map(|(chunk, (_, distance))| ScoredChunk { chunk, distance })
            .collect())
    }

    fn dimension(&self) -> Result<Option<usize>> {
        let txn = self.db.begin_read()?;
        let meta = txn.open_table(META)?;
        Ok(meta.get(META_DIMENSION)?.map(|g| g.value() as usize))
    }

    fn count(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let ids = txn.open_table(CHUNK_IDS)?;
        Ok(ids.len()? as usize)
    }

    fn upsert(&self, batch: &[Chunk]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write()?;
        let mut inserted = 0;
        {
            let mut meta = txn.open_table(META)?;
            let mut chunks = txn.open_table(CHUNKS)?;
            let mut embeddings = txn.open_table(EMBEDDINGS)?;
            let mut ids = txn.open_table(CHUNK_IDS)?;
            let mut labels = txn.open_multimap_table(LABELS)?;

            let stored_dimension =
                meta.get(META_DIMENSION)?.map(|g| g.value());
            let dimension = match stored_dimension {
                Some(d) => d as usize,
                None => {
                    let d = batch[0].embedding.len();
                    meta.insert(META_DIMENSION, d as u64)?;
                    d
                }
            };
            let mut next_seq =
                meta.get(META_NEXT_SEQ)?.map(|g| g.value()).unwrap_or(0);

            for chunk in batch {
                chunk.validate(Some(dimension))?;

                let existing = ids.get(chunk.id.as_str())?.map(|g| g.value());
                let seq = match existing {
                    Some(seq) => {
                        let old = chunks.get(seq)?.map(|g| g.value().to_vec());
                        if let Some(old) = old {
                            let old: StoredChunk =
                                serde_json::from_slice(&old)?;
                            for key in index_keys(&old.metadata) {
                                labels.remove(key.as_str(), seq)?;
                            }
                        }
                        seq
                    }
                    None => {
                        let seq = next_seq;
                        next_seq += 1;
                        ids.insert(chunk.id.as_str(), seq)?;
                        inserted += 1;
                        seq
                    }
                };

                let record = serde_json::to_vec(&StoredChunk {
                    id: chunk.id.clone(),
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                })?;
                chunks.insert(seq, record.as_slice())?;

                let bytes: &[u8] = bytemuck::cast_slice(&chunk.embedding);
                let mut guard = embeddings.insert_reserve(seq, bytes.len())?;
                guard.as_mut().copy_from_slice(bytes);
                drop(guard);

                for key in index_keys(&chunk.metadata) {
                    labels.insert(key.as_str(), seq)?;
                }
            }

            meta.insert(META_NEXT_SEQ, next_seq)?;
        }
        txn.commit()?;

        debug!(records = batch.len(), inserted, "upserted chunks");
        Ok(inserted)
    }
}

impl std::fmt::Debug for ChunkDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkDb").finish_non_exhaustive()
    }
}

fn label_key(kind: StructuralKind, value: &str) -> String {
    format!("{}\u{1f}{}", kind.field(), value)
}

/// Every index key a chunk is reachable under: each structural label as
/// stored, plus its leading locator when the label is a longer heading.
fn index_keys(metadata: &ChunkMetadata) -> Vec<String> {
    let mut keys = Vec::new();
    for kind in StructuralKind::ALL {
        let Some(label) = metadata.label(kind) else {
            continue;
        };
        keys.push(label_key(kind, label));
        if let Some(locator) = leading_locator(label) {
            keys.push(label_key(kind, locator));
        }
    }
    keys
}

fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % size_of::<f32>() != 0 {
        return Err(Error::StoreUnavailable(format!(
            "corrupt embedding record of {} bytes",
            bytes.len()
        )));
    }
    // redb does not guarantee alignment of the value slice.
    Ok(match bytemuck::try_cast_slice::<u8, f32>(bytes) {
        Ok(values) => values.to_vec(),
        Err(_) => bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, article: Option<&str>, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.into(),
            text: format!("text of {id}"),
            embedding,
            metadata: ChunkMetadata {
                source: Some("manual.pdf".into()),
                article: article.map(String::from),
                ..Default::default()
            },
        }
    }

    fn test_db() -> (tempfile::TempDir, ChunkDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = ChunkDb::open(&tmp.path().join("chunks.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn upsert_and_get() {
        let (_tmp, db) = test_db();
        let c = chunk("manual_0", Some("Artículo 1"), vec![1.0, 0.0]);
        assert_eq!(db.upsert(std::slice::from_ref(&c)).unwrap(), 1);

        assert_eq!(db.get("manual_0").unwrap(), Some(c));
        assert_eq!(db.get("missing").unwrap(), None);
        assert_eq!(db.count().unwrap(), 1);
        assert_eq!(db.dimension().unwrap(), Some(2));
    }

    #[test]
    fn exact_metadata_lookup() {
        let db = ChunkDb::open_in_memory().unwrap();
        db.upsert(&[
            chunk("a", Some("Artículo 52"), vec![1.0, 0.0]),
            chunk("b", Some("Artículo 53"), vec![0.0, 1.0]),
            chunk("c", None, vec![1.0, 1.0]),
        ])
        .unwrap();

        let found = db
            .find_by_metadata(
                StructuralKind::Article,
                &["Artículo 52".to_string()],
            )
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");

        let none = db
            .find_by_metadata(
                StructuralKind::Article,
                &["artículo 52".to_string()],
            )
            .unwrap();
        assert!(none.is_empty());

        let wrong_field = db
            .find_by_metadata(
                StructuralKind::Chapter,
                &["Artículo 52".to_string()],
            )
            .unwrap();
        assert!(wrong_field.is_empty());
    }

    #[test]
    fn variants_union_in_insertion_order_without_duplicates() {
        let db = ChunkDb::open_in_memory().unwrap();
        db.upsert(&[
            chunk("late", Some("ART. 5"), vec![1.0, 0.0]),
            chunk("first_part", Some("Artículo 5"), vec![1.0, 0.0]),
        ])
        .unwrap();
        db.upsert(&[chunk("second_part", Some("Artículo 5"), vec![0.0, 1.0])])
            .unwrap();

        let found = db
            .find_by_metadata(
                StructuralKind::Article,
                &[
                    "Artículo 5".to_string(),
                    "ART. 5".to_string(),
                    "Artículo 5".to_string(),
                ],
            )
            .unwrap();
        let ids: Vec<_> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["late", "first_part", "second_part"]);
    }

    #[test]
    fn heading_labels_are_reachable_by_locator() {
        let db = ChunkDb::open_in_memory().unwrap();
        db.upsert(&[chunk(
            "deberes",
            Some("ARTÍCULO 52. DE LOS DEBERES"),
            vec![1.0, 0.0],
        )])
        .unwrap();

        for value in ["ARTÍCULO 52", "ARTÍCULO 52. DE LOS DEBERES"] {
            let found = db
                .find_by_metadata(StructuralKind::Article, &[value.to_string()])
                .unwrap();
            assert_eq!(found.len(), 1, "lookup by {value:?}");
        }
    }

    #[test]
    fn vector_scan_orders_by_distance_then_insertion() {
        let db = ChunkDb::open_in_memory().unwrap();
        db.upsert(&[
            chunk("far", None, vec![0.0, 1.0]),
            chunk("tie_a", None, vec![1.0, 1.0]),
            chunk("near", None, vec![1.0, 0.0]),
            chunk("tie_b", None, vec![1.0, 1.0]),
        ])
        .unwrap();

        let results = db.find_by_vector(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "tie_a", "tie_b"]);
        assert!(results[0].distance < 1e-6);
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_eq!(results[0].chunk.embedding, vec![1.0, 0.0]);
    }

    #[test]
    fn vector_scan_on_empty_store() {
        let db = ChunkDb::open_in_memory().unwrap();
        assert!(db.find_by_vector(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn vector_dimension_is_checked() {
        let db = ChunkDb::open_in_memory().unwrap();
        db.upsert(&[chunk("a", None, vec![1.0, 0.0])]).unwrap();
        let err = db.find_by_vector(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn upsert_replaces_in_place() {
        let db = ChunkDb::open_in_memory().unwrap();
        db.upsert(&[
            chunk("a", Some("Artículo 1"), vec![1.0, 0.0]),
            chunk("b", Some("Artículo 2"), vec![1.0, 0.0]),
        ])
        .unwrap();

        let mut replacement = chunk("a", Some("Artículo 9"), vec![1.0, 0.0]);
        replacement.text = "updated".into();
        assert_eq!(db.upsert(&[replacement]).unwrap(), 0);
        assert_eq!(db.count().unwrap(), 2);

        let old_label = db
            .find_by_metadata(StructuralKind::Article, &["Artículo 1".into()])
            .unwrap();
        assert!(old_label.is_empty());

        let new_label = db
            .find_by_metadata(StructuralKind::Article, &["Artículo 9".into()])
            .unwrap();
        assert_eq!(new_label[0].text, "updated");

        // Insertion position is kept: "a" still wins the tie.
        let results = db.find_by_vector(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].chunk.id, "a");
    }

    #[test]
    fn upsert_rejects_mixed_dimensions_atomically() {
        let db = ChunkDb::open_in_memory().unwrap();
        let err = db
            .upsert(&[
                chunk("a", None, vec![1.0, 0.0]),
                chunk("b", None, vec![1.0, 0.0, 0.0]),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert_eq!(db.count().unwrap(), 0);
        assert_eq!(db.dimension().unwrap(), None);
    }

    #[test]
    fn chapter_numerals_match_across_forms() {
        let db = ChunkDb::open_in_memory().unwrap();
        let mut c = chunk("cap", None, vec![1.0, 0.0]);
        c.metadata.chapter =
            Some("CAPÍTULO II. DEL RÉGIMEN DISCIPLINARIO".into());
        db.upsert(&[c]).unwrap();

        let reference = &crate::resolver::resolve("capítulo 2")[0];
        let found = db
            .find_by_metadata(StructuralKind::Chapter, &reference.variants())
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "cap");
    }

    #[test]
    fn missing_record_is_not_skipped() {
        let db = ChunkDb::open_in_memory().unwrap();
        db.upsert(&[
            chunk("a", None, vec![1.0, 0.0]),
            chunk("b", None, vec![0.9, 0.1]),
        ])
        .unwrap();

        let txn = db.db.begin_write().unwrap();
        txn.open_table(CHUNKS).unwrap().remove(0u64).unwrap();
        txn.commit().unwrap();

        let err = db.find_by_vector(&[1.0, 0.0], 2).unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)), "{err:?}");
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("chunks.redb");

        {
            let db = ChunkDb::open(&path).unwrap();
            db.upsert(&[chunk("a", Some("Artículo 1"), vec![0.5, 0.5])])
                .unwrap();
        }

        {
            let db = ChunkDb::open(&path).unwrap();
            assert_eq!(db.count().unwrap(), 1);
            let found = db
                .find_by_metadata(
                    StructuralKind::Article,
                    &["Artículo 1".into()],
                )
                .unwrap();
            assert_eq!(found[0].embedding, vec![0.5, 0.5]);
        }
    }
}
