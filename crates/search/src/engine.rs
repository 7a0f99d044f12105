use crate::completeness::expand_dependencies;
use crate::error::{Result, SearchError};
use crate::hybrid::HybridIndex;
use crate::rerank::Reranker;
use codeweave_chunker::CodeChunk;
use codeweave_graph::KnowledgeStore;
use codeweave_vector_store::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Dependency hops followed from each primary hit
pub const DEPENDENCY_DEPTH: usize = 1;

/// How a chunk entered the result list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSource {
    Retrieved,
    Dependency,
}

impl ChunkSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retrieved => "retrieved",
            Self::Dependency => "dependency",
        }
    }
}

impl fmt::Display for ChunkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: CodeChunk,
    pub score: f32,
    pub source: ChunkSource,
}

/// embed → hybrid retrieve → rerank → dependency expansion
pub struct SearchEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    hybrid: HybridIndex,
    store: Arc<KnowledgeStore>,
    reranker: Reranker,
}

impl SearchEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        hybrid: HybridIndex,
        store: Arc<KnowledgeStore>,
        reranker: Reranker,
    ) -> Self {
        Self {
            embedder,
            hybrid,
            store,
            reranker,
        }
    }

    /// Ranked chunks with scores and provenance
    ///
    /// Dependency chunks score 0. A chunk already emitted by an earlier hit
    /// keeps its first tag.
    pub async fn search_scored(&self, query: &str, limit: usize, expand_deps: bool) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let embedding = self.embedder.embed_single(query).await?;
        let candidates = self.hybrid.search(query, &embedding, limit.saturating_mul(2))?;
        let reranked = self.reranker.rerank(query, candidates, Some(limit)).await;
        log::debug!("Search '{}': {} primary hits", query, reranked.len());

        let primary = reranked.into_iter().map(|(chunk, score)| ScoredChunk {
            chunk,
            score,
            source: ChunkSource::Retrieved,
        });
        if !expand_deps {
            return Ok(primary.collect());
        }

        let repository = self.hybrid.repository();
        let mut seen: HashSet<String> = HashSet::new();
        let mut expanded = Vec::new();
        for hit in primary {
            let deps = expand_dependencies(&hit.chunk, &**repository, &self.store, DEPENDENCY_DEPTH);
            for dep in deps {
                if !seen.insert(dep.id.clone()) {
                    continue;
                }
                let scored = if dep.id == hit.chunk.id {
                    ScoredChunk {
                        chunk: dep,
                        score: hit.score,
                        source: ChunkSource::Retrieved,
                    }
                } else {
                    ScoredChunk {
                        chunk: dep,
                        score: 0.0,
                        source: ChunkSource::Dependency,
                    }
                };
                expanded.push(scored);
            }
        }
        Ok(expanded)
    }

    /// Chunks only, in `search_scored` order
    pub async fn search(&self, query: &str, limit: usize, expand_deps: bool) -> Result<Vec<CodeChunk>> {
        Ok(self
            .search_scored(query, limit, expand_deps)
            .await?
            .into_iter()
            .map(|scored| scored.chunk)
            .collect())
    }
}
