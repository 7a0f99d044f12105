use crate::config::AppConfig;
use crate::error::{Result, ServiceError};
use crate::registry::ClientRegistry;
use codeweave_context::{ContextBundle, ContextSynthesizer, TaskType, TokenCounter, DEFAULT_MAX_TOKENS};
use codeweave_graph::{
    resolve_store_path, BuildStats, Entity, GraphBuilder, GraphStats, ImpactReport, KnowledgeStore,
    TraceDirection, TracedEntity, MAX_TRACE_DEPTH, MAX_TRACE_RESULTS,
};
use codeweave_indexer::{BackgroundIndexer, FileScanner, FileWatcher, IndexStats, Indexer, WorkerStats};
use codeweave_search::{HybridIndex, SearchEngine};
use codeweave_vector_store::{ChunkRepository, EmbeddingProvider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Default and maximum depth of impact analysis
pub const DEFAULT_IMPACT_DEPTH: usize = 3;
pub const MAX_IMPACT_DEPTH: usize = 5;

/// Compact entity listing used by search and neighbour queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub qualified_name: String,
    pub file: String,
    pub line: usize,
}

impl From<&Entity> for EntitySummary {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id.clone(),
            kind: entity.kind.to_string(),
            name: entity.name.clone(),
            qualified_name: entity.qualified_name.clone(),
            file: entity.location.file_path.clone(),
            line: entity.location.line_start,
        }
    }
}

/// Result of `analyze` or `index`
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeReport {
    pub store_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_dir: Option<PathBuf>,
    pub build: BuildStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexStats>,
}

/// Store, index and chunk counts
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    #[serde(flatten)]
    pub graph: GraphStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_index_size: Option<usize>,
}

/// One session over a knowledge store and its retrieval index
///
/// The store is an immutable snapshot behind an `Arc`: `reload` swaps it
/// wholesale and callers keep whatever snapshot they already hold.
pub struct KnowledgeService {
    config: AppConfig,
    clients: ClientRegistry,
    tokens: TokenCounter,
    store: RwLock<Option<Arc<KnowledgeStore>>>,
    index: RwLock<Option<Arc<Indexer>>>,
}

impl KnowledgeService {
    pub fn new(config: AppConfig, clients: ClientRegistry) -> Result<Self> {
        Ok(Self {
            config,
            clients,
            tokens: TokenCounter::new()?,
            store: RwLock::new(None),
            index: RwLock::new(None),
        })
    }

    /// Service over an already built store
    pub fn with_store(config: AppConfig, clients: ClientRegistry, store: KnowledgeStore) -> Result<Self> {
        let service = Self::new(config, clients)?;
        service.replace_store(store);
        Ok(service)
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    pub const fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn store_path(&self) -> PathBuf {
        resolve_store_path(&self.config.paths.store)
    }

    /// Current store snapshot, loading it from disk on first use
    pub fn store(&self) -> Result<Arc<KnowledgeStore>> {
        if let Some(store) = self.store.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(store));
        }
        let loaded = Arc::new(self.load_store()?);
        let mut slot = self.store.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(slot.get_or_insert(loaded)))
    }

    /// Re-read the store from disk and swap it in
    ///
    /// When the file is gone the in-memory snapshot is dropped as well.
    pub fn reload(&self) -> Result<()> {
        match self.load_store() {
            Ok(store) => {
                self.replace_store(store);
                log::info!("Reloaded knowledge store from {}", self.store_path().display());
                Ok(())
            }
            Err(err) => {
                if matches!(err, ServiceError::StoreNotFound(_)) {
                    *self.store.write().unwrap_or_else(PoisonError::into_inner) = None;
                }
                Err(err)
            }
        }
    }

    fn replace_store(&self, store: KnowledgeStore) {
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(store));
    }

    fn load_store(&self) -> Result<KnowledgeStore> {
        let path = self.store_path();
        if !path.is_file() {
            return Err(ServiceError::StoreNotFound(path));
        }
        Ok(KnowledgeStore::load(&path)?)
    }

    pub fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        self.clients.embedder(&self.config.embedding)
    }

    /// Retrieval index, loading and validating it on first use
    pub async fn indexer(&self) -> Result<Arc<Indexer>> {
        if let Some(index) = self.index.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(index));
        }
        let loaded = Indexer::load(
            &self.config.paths.index_dir,
            self.embedder()?,
            self.config.chunking.clone(),
        )
        .await?;
        let mut slot = self.index.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(slot.get_or_insert(Arc::new(loaded))))
    }

    /// Use an in-memory index instead of the one on disk
    pub fn attach_index(&self, indexer: Arc<Indexer>) {
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Some(indexer);
    }

    /// Search engine over the current index and store snapshot
    pub async fn search_engine(&self) -> Result<SearchEngine> {
        let store = self.store()?;
        self.search_engine_with(store).await
    }

    /// Search engine over the current index and a snapshot the caller holds
    pub async fn search_engine_with(&self, store: Arc<KnowledgeStore>) -> Result<SearchEngine> {
        let indexer = self.indexer().await?;
        let hybrid = HybridIndex::new(indexer.repository(), indexer.vectors(), self.config.search.alpha);
        Ok(SearchEngine::new(
            indexer.embedder(),
            hybrid,
            store,
            self.clients.reranker(self.config.search.rerank),
        ))
    }

    /// Parse `root` into a knowledge graph and save it
    pub fn analyze(&self, root: &Path, output: Option<&Path>, ignores: &[String]) -> Result<AnalyzeReport> {
        let mut builder = GraphBuilder::with_default_parsers();
        let files = FileScanner::with_ignores(root, &builder.supported_extensions(), ignores)?.scan();
        let build = builder.build_from_files(&files);

        let store = builder.into_store();
        let store_path = store.save(output.unwrap_or(&self.config.paths.store))?;
        log::info!("Saved knowledge store to {}", store_path.display());
        self.replace_store(store);

        Ok(AnalyzeReport {
            store_path,
            index_dir: None,
            build,
            index: None,
        })
    }

    /// Build the graph and the retrieval index for `root` and save both
    pub async fn index(&self, root: &Path, ignores: &[String]) -> Result<AnalyzeReport> {
        let indexer = Indexer::new(self.embedder()?, self.config.chunking.clone())?
            .with_ignore_globs(ignores.to_vec());
        let (store, stats) = indexer.index_directory(root).await?;

        let store_path = store.save(&self.config.paths.store)?;
        let paths = indexer.save(&self.config.paths.index_dir).await?;
        let build = BuildStats {
            graph: store.stats(),
            total_errors: stats.errors.len(),
        };

        self.replace_store(store);
        self.attach_index(Arc::new(indexer));
        Ok(AnalyzeReport {
            store_path,
            index_dir: Some(paths.root().to_path_buf()),
            build,
            index: Some(stats),
        })
    }

    /// Keep the retrieval index of `root` current until the session is stopped
    pub async fn watch(&self, root: &Path) -> Result<WatchSession> {
        let indexer = self.indexer().await?;
        let worker = BackgroundIndexer::start(Arc::clone(&indexer));
        let watcher = FileWatcher::start(&indexer, root, worker.sender())?;
        Ok(WatchSession {
            indexer,
            worker,
            _watcher: watcher,
            index_dir: self.config.paths.index_dir.clone(),
        })
    }

    /// Case-insensitive substring search over entity names
    pub fn search(&self, pattern: &str) -> Result<Vec<EntitySummary>> {
        let store = self.store()?;
        Ok(store.search(pattern).into_iter().map(EntitySummary::from).collect())
    }

    pub fn get_entity(&self, id: &str) -> Result<Entity> {
        self.store()?
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::entity_not_found(id))
    }

    /// Context for an exact id, else for the first lexical match
    pub fn get_context(
        &self,
        target: &str,
        max_tokens: Option<usize>,
        task: Option<TaskType>,
    ) -> Result<ContextBundle> {
        let store = self.store()?;
        let entity_id = match store.get(target) {
            Some(entity) => entity.id.clone(),
            None => store
                .search(target)
                .first()
                .map(|entity| entity.id.clone())
                .ok_or_else(|| ServiceError::entity_not_found(target))?,
        };

        self.synthesize(&store, &entity_id, max_tokens.unwrap_or(DEFAULT_MAX_TOKENS), task)
    }

    /// Context for an exact id within one snapshot
    pub(crate) fn synthesize(
        &self,
        store: &KnowledgeStore,
        entity_id: &str,
        max_tokens: usize,
        task: Option<TaskType>,
    ) -> Result<ContextBundle> {
        let synth = ContextSynthesizer::new(store, self.tokens.clone(), max_tokens);
        let bundle = match task {
            Some(task) => synth.synthesize_with_task(entity_id, task)?,
            None => synth.synthesize(entity_id)?,
        };
        Ok(bundle)
    }

    pub fn get_callers(&self, id: &str) -> Result<Vec<EntitySummary>> {
        let store = self.existing(id)?;
        Ok(store.get_callers(id).into_iter().map(EntitySummary::from).collect())
    }

    pub fn get_callees(&self, id: &str) -> Result<Vec<EntitySummary>> {
        let store = self.existing(id)?;
        Ok(store.get_callees(id).into_iter().map(EntitySummary::from).collect())
    }

    /// Call-graph walk, depth capped at the store maximum
    pub fn trace_calls(&self, id: &str, direction: TraceDirection, depth: usize) -> Result<Vec<TracedEntity>> {
        let store = self.store()?;
        Ok(store.trace_calls(id, direction, depth.clamp(1, MAX_TRACE_DEPTH), MAX_TRACE_RESULTS)?)
    }

    pub fn get_impact(&self, id: &str, max_depth: Option<usize>) -> Result<ImpactReport> {
        let depth = max_depth.unwrap_or(DEFAULT_IMPACT_DEPTH).clamp(1, MAX_IMPACT_DEPTH);
        Ok(self.store()?.get_impact(id, depth)?)
    }

    /// Graph totals plus chunk counts when an index is loaded
    pub fn stats(&self) -> Result<ServiceStats> {
        let graph = self.store()?.stats();
        let index = self
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(ServiceStats {
            graph,
            total_chunks: index.as_ref().map(|i| i.repository().len()),
            vector_index_size: index.as_ref().map(|i| i.vectors().len()),
        })
    }

    fn existing(&self, id: &str) -> Result<Arc<KnowledgeStore>> {
        let store = self.store()?;
        if store.contains(id) {
            Ok(store)
        } else {
            Err(ServiceError::entity_not_found(id))
        }
    }
}

/// Running watcher plus background worker
pub struct WatchSession {
    indexer: Arc<Indexer>,
    worker: BackgroundIndexer,
    _watcher: FileWatcher,
    index_dir: PathBuf,
}

impl WatchSession {
    pub fn stats(&self) -> WorkerStats {
        self.worker.stats()
    }

    /// Stop watching, drain the worker and persist the index
    pub async fn stop(mut self) -> Result<WorkerStats> {
        let stats = self.worker.stop().await;
        self.indexer.save(&self.index_dir).await?;
        Ok(stats)
    }
}
