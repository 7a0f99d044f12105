use crate::error::{Result, SearchError};
use async_trait::async_trait;
use codeweave_chunker::CodeChunk;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const DOCUMENTED_BOOST: f32 = 1.2;
const RECENT_BOOST: f32 = 1.1;
const CONTENT_MATCH_BOOST: f32 = 1.5;
const KIND_MATCH_BOOST: f32 = 2.0;
const RECENT_WINDOW_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// One scored document returned by a cross-encoder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankHit {
    /// Position in the submitted document list
    pub index: usize,
    pub relevance_score: f32,
}

/// External relevance model scoring `(query, document)` pairs
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Hits ordered best first, at most `top_k` when given
    async fn rerank(&self, query: &str, documents: &[String], top_k: Option<usize>) -> Result<Vec<RerankHit>>;
}

/// Reorders retrieval candidates
///
/// Uses the cross-encoder when one is configured and falls back to local
/// signal scoring on any failure.
#[derive(Clone)]
pub struct Reranker {
    cross_encoder: Option<Arc<dyn CrossEncoder>>,
    boost_recent: bool,
    boost_documented: bool,
}

impl Reranker {
    /// Signal scoring only
    pub fn local() -> Self {
        Self {
            cross_encoder: None,
            boost_recent: true,
            boost_documented: true,
        }
    }

    pub fn with_cross_encoder(cross_encoder: Arc<dyn CrossEncoder>) -> Self {
        Self {
            cross_encoder: Some(cross_encoder),
            ..Self::local()
        }
    }

    #[must_use]
    pub const fn boost_recent(mut self, enabled: bool) -> Self {
        self.boost_recent = enabled;
        self
    }

    #[must_use]
    pub const fn boost_documented(mut self, enabled: bool) -> Self {
        self.boost_documented = enabled;
        self
    }

    pub fn has_cross_encoder(&self) -> bool {
        self.cross_encoder.is_some()
    }

    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<(CodeChunk, f32)>,
        top_k: Option<usize>,
    ) -> Vec<(CodeChunk, f32)> {
        if candidates.is_empty() {
            return candidates;
        }

        if let Some(encoder) = &self.cross_encoder {
            match rerank_with_encoder(encoder.as_ref(), query, &candidates, top_k).await {
                Ok(reranked) => return reranked,
                Err(err) => log::warn!("Cross-encoder reranking failed: {err}. Using signal-based fallback."),
            }
        }

        self.rerank_with_signals(query, candidates, top_k, now_epoch_secs())
    }

    /// Multiplicative boosts for documentation, recency and query matches
    pub fn rerank_with_signals(
        &self,
        query: &str,
        candidates: Vec<(CodeChunk, f32)>,
        top_k: Option<usize>,
        now: f64,
    ) -> Vec<(CodeChunk, f32)> {
        let needle = query.to_lowercase();
        let mut reranked: Vec<(CodeChunk, f32)> = candidates
            .into_iter()
            .map(|(chunk, score)| {
                let mut adjusted = score;
                if self.boost_documented && chunk.has_docstring() {
                    adjusted *= DOCUMENTED_BOOST;
                }
                if self.boost_recent {
                    if let Some(modified) = chunk.last_modified() {
                        if now - modified < RECENT_WINDOW_SECS {
                            adjusted *= RECENT_BOOST;
                        }
                    }
                }
                if chunk.content.to_lowercase().contains(&needle) {
                    adjusted *= CONTENT_MATCH_BOOST;
                }
                if chunk.kind().is_some_and(|kind| kind.to_lowercase() == needle) {
                    adjusted *= KIND_MATCH_BOOST;
                }
                (chunk, adjusted)
            })
            .collect();

        reranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        if let Some(k) = top_k {
            reranked.truncate(k);
        }
        reranked
    }
}

impl Default for Reranker {
    fn default() -> Self {
        Self::local()
    }
}

impl std::fmt::Debug for Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker")
            .field("cross_encoder", &self.cross_encoder.is_some())
            .field("boost_recent", &self.boost_recent)
            .field("boost_documented", &self.boost_documented)
            .finish()
    }
}

async fn rerank_with_encoder(
    encoder: &dyn CrossEncoder,
    query: &str,
    candidates: &[(CodeChunk, f32)],
    top_k: Option<usize>,
) -> Result<Vec<(CodeChunk, f32)>> {
    let documents: Vec<String> = candidates.iter().map(|(c, _)| c.content.clone()).collect();
    let hits = encoder.rerank(query, &documents, top_k).await?;

    hits.into_iter()
        .map(|hit| {
            candidates
                .get(hit.index)
                .map(|(chunk, _)| (chunk.clone(), hit.relevance_score))
                .ok_or_else(|| {
                    SearchError::CrossEncoder(format!(
                        "hit index {} out of range for {} documents",
                        hit.index,
                        candidates.len()
                    ))
                })
        })
        .collect()
}

fn now_epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeweave_chunker::{META_HAS_DOCSTRING, META_KIND, META_LAST_MODIFIED};
    use pretty_assertions::assert_eq;

    const NOW: f64 = 1_700_000_000.0;

    fn chunk(id: &str, content: &str) -> CodeChunk {
        CodeChunk::new(id, id, content)
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn signals_compose_multiplicatively() {
        let documented = chunk("doc", "plain text").with_metadata(META_HAS_DOCSTRING, "true");
        let recent = chunk("recent", "plain text").with_metadata(META_LAST_MODIFIED, format!("{:.3}", NOW - 60.0));
        let stale = chunk("stale", "plain text").with_metadata(META_LAST_MODIFIED, format!("{:.3}", NOW - 8.0 * 86_400.0));
        let matching = chunk("match", "calls Payment here");
        let kind = chunk("kind", "zzz")
            .with_metadata(META_KIND, "class")
            .with_metadata(META_HAS_DOCSTRING, "true");

        let reranked = Reranker::local().rerank_with_signals(
            "payment",
            vec![(documented, 1.0), (recent, 1.0), (stale, 1.0), (matching, 1.0)],
            None,
            NOW,
        );
        let scores: Vec<_> = reranked.iter().map(|(c, s)| (c.id.as_str(), *s)).collect();
        assert_eq!(scores[0].0, "match");
        assert!(approx(scores[0].1, 1.5));
        assert!(approx(scores[1].1, 1.2));
        assert!(approx(scores[2].1, 1.1));
        assert_eq!(scores[3], ("stale", 1.0));

        let by_kind = Reranker::local().rerank_with_signals("Class", vec![(kind, 1.0)], None, NOW);
        assert!(approx(by_kind[0].1, 1.2 * 2.0));
    }

    #[test]
    fn boosts_can_be_disabled_and_top_k_truncates() {
        let reranker = Reranker::local().boost_documented(false).boost_recent(false);
        let documented = chunk("doc", "x").with_metadata(META_HAS_DOCSTRING, "true");
        let reranked = reranker.rerank_with_signals("nope", vec![(documented, 0.5), (chunk("b", "y"), 0.7)], Some(1), NOW);
        assert_eq!(reranked.len(), 1);
        assert_eq!(reranked[0].0.id, "b");
    }

    struct Reverse;

    #[async_trait]
    impl CrossEncoder for Reverse {
        async fn rerank(&self, _query: &str, documents: &[String], top_k: Option<usize>) -> Result<Vec<RerankHit>> {
            let mut hits: Vec<_> = (0..documents.len())
                .rev()
                .map(|index| RerankHit { index, relevance_score: index as f32 })
                .collect();
            hits.truncate(top_k.unwrap_or(hits.len()));
            Ok(hits)
        }
    }

    struct Broken;

    #[async_trait]
    impl CrossEncoder for Broken {
        async fn rerank(&self, _query: &str, _documents: &[String], _top_k: Option<usize>) -> Result<Vec<RerankHit>> {
            Ok(vec![RerankHit { index: 42, relevance_score: 9.0 }])
        }
    }

    #[tokio::test]
    async fn cross_encoder_scores_replace_incoming_ones() {
        let reranker = Reranker::with_cross_encoder(Arc::new(Reverse));
        let out = reranker
            .rerank("q", vec![(chunk("a", "a"), 0.9), (chunk("b", "b"), 0.1)], Some(1))
            .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0.id, "b");
        assert_eq!(out[0].1, 1.0);
    }

    #[tokio::test]
    async fn out_of_range_hits_fall_back_to_signals() {
        let reranker = Reranker::with_cross_encoder(Arc::new(Broken));
        let out = reranker
            .rerank("a", vec![(chunk("x", "zzz"), 0.2), (chunk("y", "has a"), 0.2)], None)
            .await;
        assert_eq!(out[0].0.id, "y");
        assert!(approx(out[0].1, 0.3));
        assert_eq!(out.len(), 2);
    }
}
