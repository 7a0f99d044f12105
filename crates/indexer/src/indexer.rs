use crate::error::{IndexerError, Result};
use crate::scanner::FileScanner;
use crate::stats::{FileOutcome, IndexStats};
use codeweave_chunker::{Chunker, ChunkingConfig, CodeChunk};
use codeweave_graph::{GraphBuilder, KnowledgeStore};
use codeweave_vector_store::{
    ChunkRepository, EmbeddingProvider, InMemoryChunkRepository, IndexManifest, IndexPaths,
    VectorStore, VectorStoreError,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// Content hashes of indexed files, stored next to the manifest
pub const FILE_HASHES_FILE: &str = "file_hashes.json";

/// Builds the knowledge graph and the retrieval index for a project
///
/// The chunk repository and vector store are shared through `Arc` so a
/// background worker can keep updating them while readers search.
pub struct Indexer {
    parsers: GraphBuilder,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    repository: Arc<InMemoryChunkRepository>,
    vectors: Arc<VectorStore>,
    hashes: RwLock<BTreeMap<String, String>>,
    ignore_globs: Vec<String>,
}

impl Indexer {
    /// Empty index for the given embedder
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, chunking: ChunkingConfig) -> Result<Self> {
        let dimension = embedder.config().dimension;
        Ok(Self {
            parsers: GraphBuilder::with_default_parsers(),
            chunker: Chunker::new(chunking)?,
            embedder,
            repository: Arc::new(InMemoryChunkRepository::new()),
            vectors: Arc::new(VectorStore::new(dimension)),
            hashes: RwLock::new(BTreeMap::new()),
            ignore_globs: Vec::new(),
        })
    }

    /// Extra glob patterns skipped by directory scans
    #[must_use]
    pub fn with_ignore_globs(mut self, globs: Vec<String>) -> Self {
        self.ignore_globs = globs;
        self
    }

    pub fn repository(&self) -> Arc<InMemoryChunkRepository> {
        Arc::clone(&self.repository)
    }

    pub fn vectors(&self) -> Arc<VectorStore> {
        Arc::clone(&self.vectors)
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embedder)
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.parsers.supports(path)
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        self.parsers.supported_extensions()
    }

    /// Scanner configured with this indexer's parsers and ignore globs
    pub fn scanner(&self, root: &Path) -> Result<FileScanner> {
        FileScanner::with_ignores(root, &self.supported_extensions(), &self.ignore_globs)
    }

    /// Full rebuild of the graph and the retrieval index from `root`
    ///
    /// Existing chunks and vectors are discarded first. Per-file parse
    /// errors are collected in the stats and never abort the pass.
    pub async fn index_directory(&self, root: impl AsRef<Path>) -> Result<(KnowledgeStore, IndexStats)> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(IndexerError::InvalidPath(format!(
                "Not a directory: {}",
                root.display()
            )));
        }

        let start = Instant::now();
        let mut stats = IndexStats::new();
        log::info!("Indexing project at {}", root.display());

        let files = self.scanner(root)?.scan();
        self.clear();

        let mut builder = GraphBuilder::with_default_parsers();
        let mut pending = Vec::new();
        let mut hashes = BTreeMap::new();
        for file in &files {
            let result = builder.parse_file(file);
            if !result.errors.is_empty() {
                log::warn!("{}: {} parse error(s)", result.file_path, result.errors.len());
            }

            let chunks = self.chunker.chunk_parse_result(&result);
            stats.add_file(chunks.len());
            pending.extend(chunks);

            if let Ok(bytes) = tokio::fs::read(file).await {
                hashes.insert(result.file_path.clone(), sha256_hex(&bytes));
            }
            builder.merge(result);
        }
        builder.resolve_references();

        self.embed_and_store(pending).await?;
        *self.hashes.write().unwrap_or_else(PoisonError::into_inner) = hashes;

        let build = builder.stats();
        stats.entities = build.graph.total_entities;
        stats.relationships = build.graph.total_relationships;
        stats.errors = builder.errors().to_vec();
        stats.time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        log::info!(
            "Indexed {} files: {} entities, {} relationships, {} chunks, {} errors in {} ms",
            stats.files,
            stats.entities,
            stats.relationships,
            stats.chunks,
            stats.errors.len(),
            stats.time_ms
        );
        Ok((builder.into_store(), stats))
    }

    /// Replace the chunks of one file
    ///
    /// Files whose SHA-256 did not change since they were last indexed are
    /// skipped. A file that no longer exists loses its chunks.
    pub async fn index_file(&self, path: impl AsRef<Path>) -> Result<FileOutcome> {
        let path = path.as_ref();
        if !self.supports(path) {
            return Err(IndexerError::Unsupported(path.to_path_buf()));
        }
        let key = path.to_string_lossy().into_owned();

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let removed = self.remove_file_chunks(&key);
                self.hashes
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&key);
                log::info!("Dropped {removed} chunks of deleted file {key}");
                return Ok(FileOutcome::Indexed { removed, added: 0 });
            }
            Err(err) => return Err(err.into()),
        };

        let digest = sha256_hex(&bytes);
        let unchanged = self
            .hashes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .is_some_and(|known| *known == digest);
        if unchanged {
            log::debug!("Skipping unchanged file {key}");
            return Ok(FileOutcome::Unchanged);
        }

        let result = self.parsers.parse_file(path);
        for error in &result.errors {
            log::warn!("{key}: {error}");
        }
        let source = String::from_utf8_lossy(&bytes);
        let modified = tokio::fs::metadata(path).await.and_then(|m| m.modified()).ok();
        let chunks = self.chunker.chunk_with_source(&result, Some(&source), modified);

        let removed = self.remove_file_chunks(&key);
        let added = self.embed_and_store(chunks).await?;
        self.hashes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), digest);

        log::info!("Re-indexed {key}: -{removed} +{added} chunks");
        Ok(FileOutcome::Indexed { removed, added })
    }

    /// Persist chunks, vectors and hashes, then the manifest
    pub async fn save(&self, dir: impl AsRef<Path>) -> Result<IndexPaths> {
        let paths = IndexPaths::new(dir.as_ref());
        tokio::fs::create_dir_all(paths.root()).await?;

        self.repository.save(paths.chunks()).await?;
        self.vectors.save(paths.vectors()).await?;
        let hashes = self
            .hashes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        tokio::fs::write(
            paths.root().join(FILE_HASHES_FILE),
            serde_json::to_string_pretty(&hashes)?,
        )
        .await?;

        // written last so a partial save never looks like a complete index
        IndexManifest::new(self.embedder.config(), self.chunker.config())
            .save(&paths)
            .await?;

        log::info!(
            "Saved index with {} chunks to {}",
            self.repository.len(),
            paths.root().display()
        );
        Ok(paths)
    }

    /// Load a saved index, refusing one built with other embedding settings
    pub async fn load(
        dir: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
    ) -> Result<Self> {
        let paths = IndexPaths::new(dir.as_ref());
        let manifest = IndexManifest::load(&paths).await?;
        manifest.validate(embedder.config())?;

        let repository = InMemoryChunkRepository::load(paths.chunks()).await?;
        let vectors = VectorStore::load(paths.vectors()).await?;
        let hashes = match tokio::fs::read_to_string(paths.root().join(FILE_HASHES_FILE)).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };

        log::info!(
            "Loaded index with {} chunks from {}",
            repository.len(),
            paths.root().display()
        );
        Ok(Self {
            parsers: GraphBuilder::with_default_parsers(),
            chunker: Chunker::new(chunking)?,
            embedder,
            repository: Arc::new(repository),
            vectors: Arc::new(vectors),
            hashes: RwLock::new(hashes),
            ignore_globs: Vec::new(),
        })
    }

    fn clear(&self) {
        self.repository.clear();
        self.vectors.clear();
        self.hashes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn remove_file_chunks(&self, file: &str) -> usize {
        let ids = self.repository.remove_file(file);
        self.vectors.remove_many(&ids);
        ids.len()
    }

    /// Embed in `batch_size` batches; a chunk is stored only with its vector
    async fn embed_and_store(&self, chunks: Vec<CodeChunk>) -> Result<usize> {
        let batch_size = self.embedder.config().batch_size.max(1);
        let mut added = 0;
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = self.embedder.embed(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(VectorStoreError::EmbeddingError(format!(
                    "provider returned {} vectors for {} texts",
                    embeddings.len(),
                    batch.len()
                ))
                .into());
            }
            for (chunk, vector) in batch.iter().zip(embeddings) {
                self.vectors.add(chunk.id.clone(), vector)?;
            }
            self.repository.add_many(batch.to_vec());
            added += batch.len();
        }
        Ok(added)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeweave_vector_store::{EmbeddingConfig, StubEmbeddingProvider};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn stub(dimension: usize) -> Arc<dyn EmbeddingProvider> {
        Arc::new(
            StubEmbeddingProvider::new(EmbeddingConfig {
                dimension,
                batch_size: 2,
                ..EmbeddingConfig::default()
            })
            .unwrap(),
        )
    }

    #[test]
    fn digest_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn unchanged_file_is_skipped() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("calc.py");
        fs::write(&file, "def add(a, b):\n    return a + b\n").unwrap();

        let indexer = Indexer::new(stub(16), ChunkingConfig::default()).unwrap();
        let first = indexer.index_file(&file).await.unwrap();
        assert!(matches!(first, FileOutcome::Indexed { removed: 0, added } if added > 0));
        assert_eq!(indexer.index_file(&file).await.unwrap(), FileOutcome::Unchanged);
    }

    #[tokio::test]
    async fn changed_file_replaces_its_chunks() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("calc.py");
        fs::write(&file, "def add(a, b):\n    return a + b\n").unwrap();

        let indexer = Indexer::new(stub(16), ChunkingConfig::default()).unwrap();
        indexer.index_file(&file).await.unwrap();
        let before = indexer.repository().len();

        fs::write(&file, "def sub(a, b):\n    return a - b\n").unwrap();
        let outcome = indexer.index_file(&file).await.unwrap();
        assert_eq!(outcome, FileOutcome::Indexed { removed: before, added: before });

        let ids: Vec<_> = indexer.repository().all().into_iter().map(|c| c.id).collect();
        assert!(ids.iter().any(|id| id.contains("::sub")));
        assert!(ids.iter().all(|id| !id.contains("::add")));
        assert_eq!(indexer.vectors().len(), indexer.repository().len());
    }

    #[tokio::test]
    async fn deleted_file_loses_its_chunks() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("calc.py");
        fs::write(&file, "def add(a, b):\n    return a + b\n").unwrap();

        let indexer = Indexer::new(stub(16), ChunkingConfig::default()).unwrap();
        indexer.index_file(&file).await.unwrap();
        fs::remove_file(&file).unwrap();

        let outcome = indexer.index_file(&file).await.unwrap();
        assert!(matches!(outcome, FileOutcome::Indexed { added: 0, .. }));
        assert!(indexer.repository().is_empty());
        assert!(indexer.vectors().is_empty());
    }

    #[tokio::test]
    async fn unsupported_extension_is_an_error() {
        let indexer = Indexer::new(stub(16), ChunkingConfig::default()).unwrap();
        assert!(matches!(
            indexer.index_file("main.rs").await,
            Err(IndexerError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn load_rejects_other_dimension() {
        let project = tempdir().unwrap();
        fs::write(project.path().join("calc.py"), "def add(a, b):\n    return a + b\n").unwrap();
        let out = tempdir().unwrap();

        let indexer = Indexer::new(stub(16), ChunkingConfig::default()).unwrap();
        indexer.index_directory(project.path()).await.unwrap();
        indexer.save(out.path()).await.unwrap();

        let err = Indexer::load(out.path(), stub(8), ChunkingConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            IndexerError::VectorStoreError(VectorStoreError::ManifestMismatch { field: "dimension", .. })
        ));
    }
}
