//! Chunk records as produced by the ingestion pipeline.
//!
//! A [`Chunk`] is the atomic retrievable unit: one passage of a source
//! document with its embedding and structural metadata. The retrieval core
//! never creates or edits chunks; it only reads them back from a store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    resolver::StructuralKind,
};

/// Structural and provenance metadata attached to a chunk.
///
/// Every key is optional. Keys this type does not recognise are kept in
/// [`extra`](Self::extra) so records survive a read/write cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<String>,
    /// 1-based split-order marker for a structural unit that was too long
    /// for a single chunk. Consecutive parts share the same `article`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<u32>,
    /// Sequence index of the chunk within its source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    /// The structural label stored for `kind`, if any.
    pub fn label(&self, kind: StructuralKind) -> Option<&str> {
        match kind {
            StructuralKind::Title => self.title.as_deref(),
            StructuralKind::Chapter => self.chapter.as_deref(),
            StructuralKind::Article => self.article.as_deref(),
        }
    }
}

/// A stored passage with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Check the record invariants the store relies on.
    ///
    /// `dimension` is the store's fixed vector length, when already known.
    pub fn validate(&self, dimension: Option<usize>) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidInput("chunk id is empty".into()));
        }
        if self.text.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "chunk {} has empty text",
                self.id
            )));
        }
        if self.embedding.is_empty() {
            return Err(Error::InvalidInput(format!(
                "chunk {} has no embedding",
                self.id
            )));
        }
        if let Some(expected) = dimension
            && self.embedding.len() != expected
        {
            return Err(Error::DimensionMismatch {
                expected,
                actual: self.embedding.len(),
            });
        }
        if self.embedding.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "chunk {} has a non-finite embedding value",
                self.id
            )));
        }
        if self.metadata.page == Some(0) {
            return Err(Error::InvalidInput(format!(
                "chunk {} has page 0 (pages start at 1)",
                self.id
            )));
        }
        if self.metadata.token_count == Some(0) {
            return Err(Error::InvalidInput(format!(
                "chunk {} has token_count 0",
                self.id
            )));
        }
        if self.metadata.part == Some(0) {
            return Err(Error::InvalidInput(format!(
                "chunk {} has part 0 (parts start at 1)",
                self.id
            )));
        }
        Ok(())
    }
}
