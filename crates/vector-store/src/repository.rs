use crate::error::Result;
use codeweave_chunker::CodeChunk;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{PoisonError, RwLock};

/// Storage and lexical lookup of chunks
///
/// Methods take `&self` so one repository can be shared between a
/// background indexer and concurrent readers.
pub trait ChunkRepository: Send + Sync {
    /// Insert or replace a chunk by id
    fn add(&self, chunk: CodeChunk);

    fn add_many(&self, chunks: Vec<CodeChunk>) {
        for chunk in chunks {
            self.add(chunk);
        }
    }

    fn get(&self, chunk_id: &str) -> Option<CodeChunk>;

    /// Chunks of one entity in window order
    fn get_by_entity(&self, entity_id: &str) -> Vec<CodeChunk>;

    /// Chunks scored by the number of distinct query tokens they contain
    ///
    /// Zero-overlap chunks are omitted; equal scores keep insertion order.
    fn search_by_tokens(&self, tokens: &[String], limit: usize) -> Vec<(CodeChunk, usize)>;

    /// Drop every chunk belonging to `file_path`; returns the removed ids
    fn remove_file(&self, file_path: &str) -> Vec<String>;

    /// Snapshot of all chunks in insertion order
    fn all(&self) -> Vec<CodeChunk>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct InMemoryChunkRepository {
    inner: RwLock<ChunkTable>,
}

#[derive(Debug, Default)]
struct ChunkTable {
    chunks: Vec<CodeChunk>,
    by_id: HashMap<String, usize>,
    by_entity: HashMap<String, Vec<String>>,
}

impl ChunkTable {
    fn insert(&mut self, chunk: CodeChunk) {
        let ids = self.by_entity.entry(chunk.entity_id.clone()).or_default();
        if !ids.contains(&chunk.id) {
            ids.push(chunk.id.clone());
        }

        match self.by_id.get(&chunk.id).copied() {
            Some(pos) => self.chunks[pos] = chunk,
            None => {
                self.by_id.insert(chunk.id.clone(), self.chunks.len());
                self.chunks.push(chunk);
            }
        }
    }

    fn reindex(&mut self) {
        self.by_id.clear();
        self.by_entity.clear();
        for (pos, chunk) in self.chunks.iter().enumerate() {
            self.by_id.insert(chunk.id.clone(), pos);
            self.by_entity
                .entry(chunk.entity_id.clone())
                .or_default()
                .push(chunk.id.clone());
        }
    }
}

impl InMemoryChunkRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chunks(chunks: Vec<CodeChunk>) -> Self {
        let repo = Self::new();
        repo.add_many(chunks);
        repo
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let chunks = self.all();
        log::debug!("Saving {} chunks to {:?}", chunks.len(), path.as_ref());
        tokio::fs::write(path, serde_json::to_string(&chunks)?).await?;
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = tokio::fs::read_to_string(&path).await?;
        let chunks: Vec<CodeChunk> = serde_json::from_str(&data)?;
        log::debug!("Loaded {} chunks from {:?}", chunks.len(), path.as_ref());
        Ok(Self::from_chunks(chunks))
    }
}

impl ChunkRepository for InMemoryChunkRepository {
    fn add(&self, chunk: CodeChunk) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chunk);
    }

    fn add_many(&self, chunks: Vec<CodeChunk>) {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for chunk in chunks {
            table.insert(chunk);
        }
    }

    fn get(&self, chunk_id: &str) -> Option<CodeChunk> {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let pos = *table.by_id.get(chunk_id)?;
        Some(table.chunks[pos].clone())
    }

    fn get_by_entity(&self, entity_id: &str) -> Vec<CodeChunk> {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_entity
            .get(entity_id)
            .into_iter()
            .flatten()
            .filter_map(|id| table.by_id.get(id))
            .map(|&pos| table.chunks[pos].clone())
            .collect()
    }

    fn search_by_tokens(&self, tokens: &[String], limit: usize) -> Vec<(CodeChunk, usize)> {
        let query: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }

        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<(usize, usize)> = table
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(pos, chunk)| {
                let distinct: HashSet<&str> = chunk.tokens.iter().map(String::as_str).collect();
                let overlap = distinct.intersection(&query).count();
                (overlap > 0).then_some((pos, overlap))
            })
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored
            .into_iter()
            .take(limit)
            .map(|(pos, overlap)| (table.chunks[pos].clone(), overlap))
            .collect()
    }

    fn remove_file(&self, file_path: &str) -> Vec<String> {
        let prefix = format!("{file_path}::");
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = Vec::new();
        table.chunks.retain(|chunk| {
            let owned = chunk.entity_id.starts_with(&prefix);
            if owned {
                removed.push(chunk.id.clone());
            }
            !owned
        });
        if !removed.is_empty() {
            table.reindex();
        }
        removed
    }

    fn all(&self) -> Vec<CodeChunk> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .chunks
            .clone()
    }

    fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .chunks
            .len()
    }

    fn clear(&self) {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        table.chunks.clear();
        table.reindex();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(id: &str, entity: &str, content: &str) -> CodeChunk {
        CodeChunk::new(id, entity, content)
    }

    fn query(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| (*w).to_string()).collect()
    }

    #[test]
    fn token_search_counts_distinct_overlap() {
        let repo = InMemoryChunkRepository::new();
        repo.add(chunk("a.py::f::0", "a.py::f", "payment payment payment"));
        repo.add(chunk("a.py::g::0", "a.py::g", "process payment refund"));
        repo.add(chunk("a.py::h::0", "a.py::h", "unrelated words"));

        let hits = repo.search_by_tokens(&query(&["payment", "refund", "payment"]), 10);
        let ranked: Vec<_> = hits.iter().map(|(c, s)| (c.id.as_str(), *s)).collect();
        assert_eq!(ranked, vec![("a.py::g::0", 2), ("a.py::f::0", 1)]);
    }

    #[test]
    fn token_search_ties_follow_insertion_order() {
        let repo = InMemoryChunkRepository::new();
        repo.add(chunk("z::0", "z", "shared term"));
        repo.add(chunk("a::0", "a", "shared term"));
        let ids: Vec<_> = repo
            .search_by_tokens(&query(&["shared"]), 1)
            .into_iter()
            .map(|(c, _)| c.id)
            .collect();
        assert_eq!(ids, vec!["z::0"]);
        assert!(repo.search_by_tokens(&[], 5).is_empty());
    }

    #[test]
    fn replace_keeps_position_and_entity_order() {
        let repo = InMemoryChunkRepository::new();
        repo.add(chunk("e::0", "e", "first window"));
        repo.add(chunk("e::1", "e", "second window"));
        repo.add(chunk("e::0", "e", "rewritten window"));

        assert_eq!(repo.len(), 2);
        let windows: Vec<_> = repo.get_by_entity("e").into_iter().map(|c| c.content).collect();
        assert_eq!(windows, vec!["rewritten window", "second window"]);
        assert_eq!(repo.get("e::0").map(|c| c.content), Some("rewritten window".into()));
    }

    #[test]
    fn remove_file_only_drops_that_file() {
        let repo = InMemoryChunkRepository::new();
        repo.add(chunk("a.py::f::0", "a.py::f", "alpha"));
        repo.add(chunk("a.py::module::0", "a.py::module", "header"));
        repo.add(chunk("ab.py::g::0", "ab.py::g", "beta"));

        let mut removed = repo.remove_file("a.py");
        removed.sort();
        assert_eq!(removed, vec!["a.py::f::0", "a.py::module::0"]);
        assert_eq!(repo.len(), 1);
        assert!(repo.get_by_entity("a.py::f").is_empty());
        assert!(repo.get("ab.py::g::0").is_some());

        repo.clear();
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.json");
        let repo = InMemoryChunkRepository::from_chunks(vec![
            chunk("b::0", "b", "second"),
            chunk("a::0", "a", "first"),
        ]);
        repo.save(&path).await.unwrap();

        let loaded = InMemoryChunkRepository::load(&path).await.unwrap();
        assert_eq!(loaded.all(), repo.all());
    }
}
