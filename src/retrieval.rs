//! The hybrid retrieval coordinator.
//!
//! A query is answered in two phases. Structural references ("artículo
//! 52") are looked up exactly first; whatever slots remain are filled by
//! vector similarity. Exact matches always outrank vector matches.

use std::{collections::HashSet, sync::Arc};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    accessor::{EncoderHandle, RetryPolicy, StoreAccessor},
    chunk::Chunk,
    config::RetrievalConfig,
    context::citation_header,
    encoder::Encoder,
    error::{Error, Result},
    query::Query,
    resolver::resolve,
    store::{ChunkStore, ScoredChunk},
    text_util::extract_snippet,
    vector_search::VectorSearch,
};

/// Relevance given to exact structural matches.
pub const EXACT_SCORE: f32 = 1.0;

/// Vector scores stay strictly below [`EXACT_SCORE`], so sorting by score
/// agrees with the ranking even for a vector hit at distance zero.
pub const MAX_VECTOR_SCORE: f32 = 0.999;

/// How a hit was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    ExactMetadata,
    VectorSimilarity,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MatchKind::ExactMetadata => "exact",
            MatchKind::VectorSimilarity => "vector",
        })
    }
}

/// One ranked chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    pub chunk: Chunk,
    /// `1.0` for exact matches, `1 - cosine distance` (capped at
    /// [`MAX_VECTOR_SCORE`]) for vector matches.
    pub score: f32,
    /// Cosine distance, for vector matches.
    pub distance: Option<f32>,
    pub match_kind: MatchKind,
}

impl RetrievalHit {
    fn exact(chunk: Chunk) -> Self {
        Self {
            chunk,
            score: EXACT_SCORE,
            distance: None,
            match_kind: MatchKind::ExactMetadata,
        }
    }

    fn vector(scored: ScoredChunk) -> Self {
        Self {
            score: (1.0 - scored.distance).clamp(0.0, MAX_VECTOR_SCORE),
            distance: Some(scored.distance),
            chunk: scored.chunk,
            match_kind: MatchKind::VectorSimilarity,
        }
    }
}

/// Ranked hits: exact matches in discovery order, then vector matches by
/// ascending distance. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievalHit>,
    /// One retrieval path failed and the hits come from the other.
    pub degraded: bool,
}

/// The outcome of a retrieval. Finding nothing is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Found(RetrievalResult),
    NoRelevantContent,
}

impl Retrieval {
    pub fn hits(&self) -> &[RetrievalHit] {
        match self {
            Retrieval::Found(result) => &result.hits,
            Retrieval::NoRelevantContent => &[],
        }
    }
}

/// Answers queries against a shared store and encoder.
///
/// Cheap to clone; clones share the store and the encoder.
#[derive(Clone)]
pub struct Retriever {
    store: StoreAccessor,
    encoder: EncoderHandle,
    search: VectorSearch,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        encoder: Arc<dyn Encoder>,
        config: RetrievalConfig,
    ) -> Self {
        let store = StoreAccessor::new(
            store,
            RetryPolicy {
                timeout: config.store_timeout,
                backoff: config.retry_backoff,
            },
        );
        let encoder = EncoderHandle::new(
            encoder,
            RetryPolicy {
                timeout: config.encoder_timeout,
                backoff: config.retry_backoff,
            },
        );
        Self {
            store,
            encoder,
            search: VectorSearch::new(config.max_distance),
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve up to `top_k` chunks (default: the configured `top_k`) for
    /// `query_text`.
    ///
    /// Fails with `InvalidInput` on empty text or a zero `top_k`,
    /// `StoreUnavailable` when the store cannot be reached after a retry,
    /// and `EncoderUnavailable` when the model cannot be invoked.
    pub async fn retrieve(
        &self,
        query_text: &str,
        top_k: Option<usize>,
    ) -> Result<Retrieval> {
        let query = Query::with_max_chars(
            query_text,
            top_k,
            self.config.max_query_chars,
        )?;
        self.retrieve_query(&query).await
    }

    pub async fn retrieve_query(&self, query: &Query) -> Result<Retrieval> {
        let cap = self.effective_top_k(query.top_k())?;

        // Phase 1: exact structural lookups
        let references = resolve(query.text());
        debug!(
            references = ?references
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            "resolved query"
        );

        let mut hits: Vec<RetrievalHit> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut failure: Option<Error> = None;

        for reference in &references {
            if hits.len() >= cap {
                break;
            }
            match self.store.find_by_reference(reference).await {
                Ok(chunks) => {
                    for chunk in chunks {
                        if hits.len() >= cap {
                            break;
                        }
                        if seen.insert(chunk.id.clone()) {
                            hits.push(RetrievalHit::exact(chunk));
                        }
                    }
                }
                Err(err) if err.is_transient() => {
                    warn!(
                        error = %err,
                        "metadata lookup failed, falling back to vector search"
                    );
                    failure = Some(err);
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        let exact = hits.len();

        // Phase 2: vector fallback for the remaining slots
        if hits.len() < cap {
            match self.vector_hits(query, cap - hits.len(), &seen).await {
                Ok(scored) => {
                    hits.extend(scored.into_iter().map(RetrievalHit::vector));
                }
                Err(err) if err.is_transient() => {
                    warn!(error = %err, "vector search failed");
                    failure.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }

        // Phase 3: outcome
        if let Some(err) = failure {
            if hits.is_empty() {
                return Err(err);
            }
            warn!(
                hits = hits.len(),
                error = %err,
                "returning partial results"
            );
            return Ok(Retrieval::Found(RetrievalResult {
                hits,
                degraded: true,
            }));
        }

        info!(
            exact,
            vector = hits.len() - exact,
            cap,
            "retrieval complete"
        );
        if hits.is_empty() {
            return Ok(Retrieval::NoRelevantContent);
        }
        Ok(Retrieval::Found(RetrievalResult {
            hits,
            degraded: false,
        }))
    }

    async fn vector_hits(
        &self,
        query: &Query,
        k: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<ScoredChunk>> {
        let vector = self.encoder.encode(query.text()).await?;
        self.search.search(&self.store, vector, k, exclude).await
    }

    fn effective_top_k(&self, requested: Option<usize>) -> Result<usize> {
        let max = self.config.max_top_k.max(1);
        match requested {
            None => Ok(self.config.top_k.clamp(1, max)),
            Some(0) => {
                Err(Error::InvalidInput("top_k must be at least 1".into()))
            }
            Some(k) => Ok(k.min(max)),
        }
    }
}

/// Format results for human-readable terminal output.
pub fn format_human(retrieval: &Retrieval, query: &str) {
    let Retrieval::Found(result) = retrieval else {
        println!("No relevant content found.");
        return;
    };

    for (i, hit) in result.hits.iter().enumerate() {
        println!(
            "{:>3}. [{} {:.3}] {} #{}",
            i + 1,
            hit.match_kind,
            hit.score,
            citation_header(&hit.chunk.metadata),
            hit.chunk.id
        );
        if let Some((snippet, _)) = extract_snippet(&hit.chunk.text, query) {
            for line in snippet.lines() {
                println!("     {line}");
            }
        }
    }
    if result.degraded {
        println!("\n(partial results: one retrieval path was unavailable)");
    }
    println!("\n{} result(s)", result.hits.len());
}

/// Format results as JSON output.
pub fn format_json(retrieval: &Retrieval, query: &str) -> Result<()> {
    let results: Vec<serde_json::Value> = retrieval
        .hits()
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            serde_json::json!({
                "rank": i + 1,
                "id": hit.chunk.id,
                "match_kind": hit.match_kind,
                "score": hit.score,
                "distance": hit.distance,
                "citation": citation_header(&hit.chunk.metadata),
                "metadata": hit.chunk.metadata,
                "text": hit.chunk.text,
            })
        })
        .collect();

    let degraded = matches!(retrieval, Retrieval::Found(r) if r.degraded);
    let out = serde_json::json!({
        "query": query,
        "result_count": results.len(),
        "degraded": degraded,
        "results": results,
    });
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}
