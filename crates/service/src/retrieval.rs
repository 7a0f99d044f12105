use crate::config::RetrievalSettings;
use crate::error::{Result, ServiceError};
use crate::service::KnowledgeService;
use codeweave_context::{classify_query, TaskType, SECTION_SEPARATOR};
use codeweave_graph::KnowledgeStore;
use codeweave_search::{ChunkSource, ScoredChunk};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Per-entity budget bounds
pub const MIN_ENTITY_TOKENS: usize = 200;
pub const MAX_ENTITY_TOKENS: usize = 2000;

/// Words too generic to narrow a lexical lookup
const STOPWORDS: &[&str] = &[
    "where", "what", "which", "when", "does", "this", "that", "with", "from", "have", "there",
    "these", "those", "into", "about", "function", "class", "method", "defined", "code", "should",
    "would", "could", "explain", "find", "show",
];

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("valid regex"));

/// How the entities of a retrieval were chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Semantic,
    Lexical,
    None,
}

impl RetrievalMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Lexical => "lexical",
            Self::None => "none",
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalOptions {
    pub max_tokens: usize,
    /// Skips classification when set
    pub task: Option<TaskType>,
    pub limit_entities: usize,
    pub expand_deps: bool,
}

impl From<&RetrievalSettings> for RetrievalOptions {
    fn from(settings: &RetrievalSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            task: None,
            limit_entities: settings.limit_entities,
            expand_deps: settings.expand_deps,
        }
    }
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self::from(&RetrievalSettings::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedEntity {
    pub rank: usize,
    pub entity_id: String,
    pub score: f32,
    /// `retrieved` for semantic hits, `lexical` for name matches
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    pub rank: usize,
    pub chunk_id: String,
    pub entity_id: String,
    pub score: f32,
    pub source: ChunkSource,
}

/// Answerable context for a free-form query; never an error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub query: String,
    pub task_type: TaskType,
    pub task_confidence: f64,
    pub retrieval_mode: RetrievalMode,
    pub selected_entities: Vec<SelectedEntity>,
    pub evidence: Vec<Evidence>,
    pub context_text: String,
    pub total_tokens: usize,
    pub truncated: bool,
    pub sufficiency_score: f64,
    pub needs_escalation: bool,
    pub errors: Vec<String>,
}

impl KnowledgeService {
    /// Classify, retrieve, and synthesize context for `query`
    ///
    /// Semantic retrieval runs against the saved index; any failure there
    /// (missing index, embedding mismatch, provider error) is recorded in
    /// `errors` and lexical name matching takes over.
    pub async fn retrieve_context_for_query(&self, query: &str, options: RetrievalOptions) -> RetrievalResult {
        let (task_type, task_confidence) = match options.task {
            Some(task) => (task, 1.0),
            None => classify_query(query),
        };
        let limit = options.limit_entities.max(1);
        let mut result = RetrievalResult {
            query: query.to_string(),
            task_type,
            task_confidence,
            retrieval_mode: RetrievalMode::None,
            selected_entities: Vec::new(),
            evidence: Vec::new(),
            context_text: String::new(),
            total_tokens: 0,
            truncated: false,
            sufficiency_score: 0.0,
            needs_escalation: true,
            errors: Vec::new(),
        };

        if query.trim().is_empty() {
            result.errors.push("Query is empty".to_string());
            return result;
        }
        let store = match self.store() {
            Ok(store) => store,
            Err(err) => {
                result.errors.push(err.to_string());
                return result;
            }
        };

        match self.semantic_hits(&store, query, limit, options.expand_deps).await {
            Ok(hits) => {
                result.evidence = evidence(&hits);
                result.selected_entities = select_retrieved(&hits, &store, limit);
                if !result.selected_entities.is_empty() {
                    result.retrieval_mode = RetrievalMode::Semantic;
                }
            }
            Err(err) => {
                log::warn!("Semantic retrieval failed, falling back to lexical: {err}");
                result.errors.push(format!("semantic retrieval failed: {err}"));
            }
        }
        if result.retrieval_mode == RetrievalMode::None {
            result.selected_entities = select_lexical(query, &store, limit);
            result.retrieval_mode = RetrievalMode::Lexical;
        }

        let per_entity = (options.max_tokens / limit).clamp(MIN_ENTITY_TOKENS, MAX_ENTITY_TOKENS);
        let mut parts = Vec::new();
        let mut scores = Vec::new();
        for selected in &result.selected_entities {
            match self.synthesize(&store, &selected.entity_id, per_entity, Some(task_type)) {
                Ok(bundle) => {
                    result.total_tokens += bundle.total_tokens;
                    result.truncated |= bundle.truncated;
                    scores.push(bundle.sufficiency_score);
                    parts.push(bundle.context_text);
                }
                Err(err) => result.errors.push(format!("{}: {err}", selected.entity_id)),
            }
        }

        result.context_text = parts.join(SECTION_SEPARATOR);
        if !scores.is_empty() {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            result.sufficiency_score = (mean * 100.0).round() / 100.0;
        }
        result.needs_escalation = result.sufficiency_score < self.config().sufficiency_threshold;

        log::info!(
            "Retrieved {} entities for '{}' ({} mode, task {}, {} tokens)",
            result.selected_entities.len(),
            query,
            result.retrieval_mode,
            task_type,
            result.total_tokens
        );
        result
    }

    async fn semantic_hits(
        &self,
        store: &Arc<KnowledgeStore>,
        query: &str,
        limit: usize,
        expand_deps: bool,
    ) -> Result<Vec<ScoredChunk>> {
        let engine = self.search_engine_with(Arc::clone(store)).await?;
        engine
            .search_scored(query, limit, expand_deps)
            .await
            .map_err(ServiceError::from)
    }
}

fn evidence(hits: &[ScoredChunk]) -> Vec<Evidence> {
    hits.iter()
        .enumerate()
        .map(|(rank, hit)| Evidence {
            rank: rank + 1,
            chunk_id: hit.chunk.id.clone(),
            entity_id: hit.chunk.entity_id.clone(),
            score: hit.score,
            source: hit.source,
        })
        .collect()
}

/// First distinct retrieved entities in score order
///
/// Hits whose entity is absent from the current snapshot are passed over.
fn select_retrieved(hits: &[ScoredChunk], store: &KnowledgeStore, limit: usize) -> Vec<SelectedEntity> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    for hit in hits.iter().filter(|h| h.source == ChunkSource::Retrieved) {
        let id = &hit.chunk.entity_id;
        if !store.contains(id) || !seen.insert(id.clone()) {
            continue;
        }
        selected.push(SelectedEntity {
            rank: selected.len() + 1,
            entity_id: id.clone(),
            score: hit.score,
            source: ChunkSource::Retrieved.as_str().to_string(),
        });
        if selected.len() >= limit {
            break;
        }
    }
    selected
}

/// Name matches for the raw query, then for each keyword
fn select_lexical(query: &str, store: &KnowledgeStore, limit: usize) -> Vec<SelectedEntity> {
    let mut patterns = vec![query.trim().to_string()];
    patterns.extend(extract_keywords(query));

    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    'patterns: for pattern in &patterns {
        for entity in store.search(pattern) {
            if !seen.insert(entity.id.clone()) {
                continue;
            }
            selected.push(SelectedEntity {
                rank: selected.len() + 1,
                entity_id: entity.id.clone(),
                score: 0.0,
                source: "lexical".to_string(),
            });
            if selected.len() >= limit {
                break 'patterns;
            }
        }
    }
    selected
}

/// Identifier-like words longer than three characters, minus stopwords
pub fn extract_keywords(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    IDENTIFIER
        .find_iter(query)
        .map(|m| m.as_str())
        .filter(|word| word.len() > 3)
        .filter(|word| !STOPWORDS.contains(&word.to_lowercase().as_str()))
        .filter(|word| seen.insert(word.to_lowercase()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keywords_drop_short_and_stop_words() {
        assert_eq!(
            extract_keywords("Where is the parse_config function defined? Where is Parse_Config used"),
            vec!["parse_config", "used"]
        );
        assert!(extract_keywords("what does this do").is_empty());
    }

    #[test]
    fn budget_split_is_clamped() {
        let split = |max: usize, limit: usize| (max / limit).clamp(MIN_ENTITY_TOKENS, MAX_ENTITY_TOKENS);
        assert_eq!(split(6000, 3), 2000);
        assert_eq!(split(300, 3), 200);
        assert_eq!(split(9000, 3), 2000);
        assert_eq!(split(1500, 3), 500);
    }
}
