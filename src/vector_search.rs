use std::collections::HashSet;

use tracing::debug;

use crate::{accessor::StoreAccessor, error::Result, store::ScoredChunk};

/// Nearest-neighbour search with a relevance cutoff.
#[derive(Debug, Clone, Copy)]
pub struct VectorSearch {
    /// Matches farther than this cosine distance are not relevant.
    pub max_distance: f32,
}

impl VectorSearch {
    pub fn new(max_distance: f32) -> Self {
        Self { max_distance }
    }

    /// Up to `k` chunks near `vector`, skipping ids in `exclude`.
    ///
    /// Everything beyond the cutoff is dropped; an empty result means "no
    /// relevant content", not an error.
    pub async fn search(
        &self,
        store: &StoreAccessor,
        vector: Vec<f32>,
        k: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        // Over-fetch so excluded ids do not eat into the k slots.
        let candidates = store.find_by_vector(vector, k + exclude.len()).await?;
        let fetched = candidates.len();
        let kept = self.filter(candidates, k, exclude);
        debug!(
            fetched,
            kept = kept.len(),
            max_distance = self.max_distance,
            "vector search"
        );
        Ok(kept)
    }

    fn filter(
        &self,
        candidates: Vec<ScoredChunk>,
        k: usize,
        exclude: &HashSet<String>,
    ) -> Vec<ScoredChunk> {
        candidates
            .into_iter()
            .filter(|c| c.distance <= self.max_distance)
            .filter(|c| !exclude.contains(&c.chunk.id))
            .take(k)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;

    fn scored(id: &str, distance: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: id.into(),
                text: id.into(),
                embedding: vec![1.0],
                metadata: Default::default(),
            },
            distance,
        }
    }

    fn ids(results: &[ScoredChunk]) -> Vec<&str> {
        results.iter().map(|r| r.chunk.id.as_str()).collect()
    }

    #[test]
    fn cutoff_drops_distant_matches() {
        let search = VectorSearch::new(0.5);
        let kept = search.filter(
            vec![scored("a", 0.1), scored("b", 0.5), scored("c", 0.51)],
            10,
            &HashSet::new(),
        );
        assert_eq!(ids(&kept), vec!["a", "b"]);
    }

    #[test]
    fn everything_beyond_cutoff_is_empty() {
        let search = VectorSearch::new(0.2);
        let kept = search.filter(
            vec![scored("a", 0.9), scored("b", 1.3)],
            5,
            &HashSet::new(),
        );
        assert!(kept.is_empty());
    }

    #[test]
    fn excluded_ids_do_not_take_slots() {
        let search = VectorSearch::new(1.0);
        let exclude: HashSet<String> = ["a".to_string()].into();
        let kept = search.filter(
            vec![scored("a", 0.0), scored("b", 0.1), scored("c", 0.2)],
            2,
            &exclude,
        );
        assert_eq!(ids(&kept), vec!["b", "c"]);
    }
}
