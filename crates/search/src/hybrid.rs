use crate::error::Result;
use crate::fusion::RrfFusion;
use codeweave_chunker::{tokenize_code, CodeChunk};
use codeweave_vector_store::{ChunkRepository, VectorStore};
use std::sync::Arc;

/// Sparse token-overlap retrieval fused with dense vector retrieval
pub struct HybridIndex {
    repository: Arc<dyn ChunkRepository>,
    vectors: Arc<VectorStore>,
    fusion: RrfFusion,
}

impl HybridIndex {
    pub fn new(repository: Arc<dyn ChunkRepository>, vectors: Arc<VectorStore>, alpha: f32) -> Self {
        Self {
            repository,
            vectors,
            fusion: RrfFusion::new(alpha),
        }
    }

    pub fn repository(&self) -> &Arc<dyn ChunkRepository> {
        &self.repository
    }

    pub const fn alpha(&self) -> f32 {
        self.fusion.alpha()
    }

    /// Top `limit` chunks by fused score
    ///
    /// Each side contributes up to `2 * limit` candidates. Ids the repository
    /// no longer holds are skipped.
    pub fn search(&self, query: &str, query_embedding: &[f32], limit: usize) -> Result<Vec<(CodeChunk, f32)>> {
        let pool = limit.saturating_mul(2);

        let sparse: Vec<String> = self
            .repository
            .search_by_tokens(&tokenize_code(query), pool)
            .into_iter()
            .map(|(chunk, _)| chunk.id)
            .collect();
        let dense: Vec<String> = self
            .vectors
            .search(query_embedding, pool)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        log::debug!(
            "Hybrid candidates for '{}': sparse={}, dense={}",
            query,
            sparse.len(),
            dense.len()
        );

        Ok(self
            .fusion
            .fuse(&sparse, &dense)
            .into_iter()
            .take(limit)
            .filter_map(|(id, score)| self.repository.get(&id).map(|chunk| (chunk, score)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeweave_vector_store::InMemoryChunkRepository;
    use pretty_assertions::assert_eq;

    fn fixture() -> (Arc<InMemoryChunkRepository>, Arc<VectorStore>) {
        let repo = Arc::new(InMemoryChunkRepository::new());
        repo.add(CodeChunk::new("c1::0", "c1", "parse payment request"));
        repo.add(CodeChunk::new("c2::0", "c2", "parse something"));

        let vectors = Arc::new(VectorStore::new(2));
        vectors.add("c2::0", vec![1.0, 0.0]).unwrap();
        vectors.add("c1::0", vec![0.6, 0.8]).unwrap();
        (repo, vectors)
    }

    #[test]
    fn fused_scores_follow_rrf_formula() {
        let (repo, vectors) = fixture();
        let index = HybridIndex::new(repo, vectors, 0.5);

        // sparse: c1 (2 tokens), c2 (1 token); dense: c2, c1
        let results = index.search("parse payment", &[1.0, 0.0], 5).unwrap();
        assert_eq!(results.len(), 2);
        let expected = 0.5 / 61.0 + 0.5 / 62.0;
        for (_, score) in &results {
            assert!((score - expected).abs() < 1e-7);
        }
    }

    #[test]
    fn alpha_extremes_reproduce_single_rankings() {
        let (repo, vectors) = fixture();
        let sparse_only = HybridIndex::new(repo.clone(), vectors.clone(), 0.0);
        let ids: Vec<_> = sparse_only
            .search("parse payment", &[1.0, 0.0], 5)
            .unwrap()
            .into_iter()
            .map(|(c, _)| c.id)
            .collect();
        assert_eq!(ids, vec!["c1::0", "c2::0"]);

        let dense_only = HybridIndex::new(repo, vectors, 1.0);
        let ids: Vec<_> = dense_only
            .search("parse payment", &[1.0, 0.0], 5)
            .unwrap()
            .into_iter()
            .map(|(c, _)| c.id)
            .collect();
        assert_eq!(ids, vec!["c2::0", "c1::0"]);
    }

    #[test]
    fn vectors_without_chunks_are_skipped() {
        let (repo, vectors) = fixture();
        vectors.add("ghost::0", vec![1.0, 0.0]).unwrap();
        let index = HybridIndex::new(repo, vectors, 1.0);
        let ids: Vec<_> = index
            .search("nothing", &[1.0, 0.0], 5)
            .unwrap()
            .into_iter()
            .map(|(c, _)| c.id)
            .collect();
        assert_eq!(ids, vec!["c2::0", "c1::0"]);
    }

    #[test]
    fn dimension_mismatch_surfaces() {
        let (repo, vectors) = fixture();
        let index = HybridIndex::new(repo, vectors, 0.5);
        assert!(index.search("parse", &[1.0, 0.0, 0.0], 5).is_err());
    }
}
