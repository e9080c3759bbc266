//! In-crate test doubles shared by the unit tests.

use std::{
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use crate::{
    chunk::{Chunk, ChunkMetadata},
    chunk_db::ChunkDb,
    encoder::{Encoder, validate_text},
    error::{Error, Result},
    resolver::StructuralKind,
    store::{ChunkStore, ScoredChunk},
    text_util::fold,
};

/// Deterministic encoder over three topic axes plus a small bias, so
/// unrelated text lands orthogonal to every topic.
pub struct KeywordEncoder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

pub const TOPICS: [&str; 3] = ["deber", "falta", "horario"];

impl KeywordEncoder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Encoder for KeywordEncoder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        validate_text(text)?;
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::EncoderUnavailable("model offline".into()));
        }
        let folded = fold(text);
        let mut v: Vec<f32> = TOPICS
            .iter()
            .map(|t| if folded.contains(t) { 1.0 } else { 0.0 })
            .collect();
        // Topic-free text points along its own axis.
        v.push(if v.iter().all(|x| *x == 0.0) { 1.0 } else { 0.0 });
        Ok(v)
    }

    fn model_id(&self) -> &str {
        "keyword-test-encoder"
    }
}

/// A [`ChunkDb`] wrapper that counts calls and can be told to fail.
pub struct ScriptedStore {
    pub inner: ChunkDb,
    pub metadata_calls: AtomicUsize,
    pub vector_calls: AtomicUsize,
    pub fail_metadata: AtomicBool,
    pub fail_vector: AtomicBool,
    delay_ms: AtomicU64,
}

impl ScriptedStore {
    pub fn new(chunks: &[Chunk]) -> Self {
        let inner = ChunkDb::open_in_memory().unwrap();
        inner.upsert(chunks).unwrap();
        Self {
            inner,
            metadata_calls: AtomicUsize::new(0),
            vector_calls: AtomicUsize::new(0),
            fail_metadata: AtomicBool::new(false),
            fail_vector: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn vector_calls(&self) -> usize {
        self.vector_calls.load(Ordering::SeqCst)
    }

    /// Make every later store call block for `delay` first.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn pause(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }
}

impl ChunkStore for ScriptedStore {
    fn find_by_metadata(
        &self,
        kind: StructuralKind,
        values: &[String],
    ) -> Result<Vec<Chunk>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.pause();
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("connection refused")));
        }
        self.inner.find_by_metadata(kind, values)
    }

    fn find_by_vector(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        self.vector_calls.fetch_add(1, Ordering::SeqCst);
        self.pause();
        if self.fail_vector.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("connection refused")));
        }
        self.inner.find_by_vector(vector, k)
    }

    fn dimension(&self) -> Result<Option<usize>> {
        self.inner.dimension()
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }

    fn upsert(&self, chunks: &[Chunk]) -> Result<usize> {
        self.inner.upsert(chunks)
    }
}

pub fn chunk(
    id: &str,
    text: &str,
    article: Option<&str>,
    embedding: [f32; 4],
) -> Chunk {
    Chunk {
        id: id.into(),
        text: text.into(),
        embedding: embedding.to_vec(),
        metadata: ChunkMetadata {
            source: Some("manual_convivencia.pdf".into()),
            article: article.map(String::from),
            ..Default::default()
        },
    }
}

/// A small manual: a split article 52 on duties, article 53 on faults,
/// and an untitled passage about schedules.
pub fn manual() -> Vec<Chunk> {
    let mut second_part = chunk(
        "manual_1",
        "…continúa: son deberes cumplir el horario escolar.",
        Some("Artículo 52"),
        [0.9, 0.0, 0.3, 0.0],
    );
    second_part.metadata.part = Some(2);

    let mut first_part = chunk(
        "manual_0",
        "ARTÍCULO 52. Son deberes de los estudiantes respetar a sus compañeros.",
        Some("Artículo 52"),
        [1.0, 0.0, 0.0, 0.0],
    );
    first_part.metadata.part = Some(1);

    vec![
        first_part,
        second_part,
        chunk(
            "manual_2",
            "ARTÍCULO 53. DE LAS FALTAS. Se consideran faltas leves...",
            Some("ARTÍCULO 53. DE LAS FALTAS"),
            [0.0, 1.0, 0.0, 0.0],
        ),
        chunk(
            "manual_3",
            "La jornada escolar sigue el horario publicado por rectoría.",
            None,
            [0.0, 0.0, 1.0, 0.0],
        ),
    ]
}
