//! Bounded context assembly for the generation step.
//!
//! Each retrieved chunk becomes one entry: a citation header built from its
//! metadata, a newline, then the chunk text. Entries are joined with
//! [`DELIMITER`]. When the whole set does not fit the character budget,
//! whole entries are dropped from the lowest-ranked end; a chunk is never
//! cut in the middle.

use serde::Serialize;

use crate::{
    chunk::ChunkMetadata,
    retrieval::{MatchKind, RetrievalHit},
};

pub const DELIMITER: &str = "\n\n---\n\n";

pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 3000;

/// Citation data for one chunk of an assembled context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub id: String,
    pub source: Option<String>,
    pub header: String,
    pub score: f32,
    pub match_kind: MatchKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    /// The formatted context handed to generation.
    pub text: String,
    /// One entry per chunk included in `text`, in rank order.
    pub citations: Vec<Citation>,
    /// How many lower-ranked chunks did not fit the budget.
    pub dropped: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}

/// The bracketed citation header for a chunk.
///
/// # Examples
///
/// ```
/// use lexbert::{ChunkMetadata, context::citation_header};
///
/// let meta = ChunkMetadata {
///     source: Some("manual.pdf".into()),
///     article: Some("Artículo 52".into()),
///     page: Some(14),
///     ..Default::default()
/// };
/// assert_eq!(citation_header(&meta), "[manual.pdf | Artículo 52 | p. 14]");
/// assert_eq!(citation_header(&ChunkMetadata::default()), "[unknown source]");
/// ```
pub fn citation_header(metadata: &ChunkMetadata) -> String {
    let mut parts: Vec<String> = [
        &metadata.source,
        &metadata.article,
        &metadata.chapter,
        &metadata.title,
    ]
    .into_iter()
    .flatten()
    .map(|s| s.trim())
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .collect();

    if let Some(page) = metadata.page {
        parts.push(format!("p. {page}"));
    }
    if let Some(part) = metadata.part
        && part > 1
    {
        parts.push(format!("part {part}"));
    }

    if parts.is_empty() {
        "[unknown source]".to_string()
    } else {
        format!("[{}]", parts.join(" | "))
    }
}

/// Format ranked hits into one context of at most `max_chars` characters.
pub fn assemble(hits: &[RetrievalHit], max_chars: usize) -> AssembledContext {
    let delimiter_chars = DELIMITER.chars().count();

    let mut text = String::new();
    let mut used = 0;
    let mut citations = Vec::new();

    for hit in hits {
        let header = citation_header(&hit.chunk.metadata);
        let entry = format!("{header}\n{}", hit.chunk.text.trim());
        let entry_chars = entry.chars().count();
        let separator = if citations.is_empty() { 0 } else { delimiter_chars };

        if used + separator + entry_chars > max_chars {
            break;
        }

        if separator > 0 {
            text.push_str(DELIMITER);
        }
        text.push_str(&entry);
        used += separator + entry_chars;

        citations.push(Citation {
            id: hit.chunk.id.clone(),
            source: hit.chunk.metadata.source.clone(),
            header,
            score: hit.score,
            match_kind: hit.match_kind,
        });
    }

    AssembledContext {
        dropped: hits.len() - citations.len(),
        text,
        citations,
    }
}
