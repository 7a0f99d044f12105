use crate::embeddings::cosine_similarity;
use crate::error::{Result, VectorStoreError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

/// Flat (exhaustive) cosine index keyed by chunk id
///
/// Insertion order is kept so equal scores rank deterministically.
#[derive(Debug)]
pub struct VectorStore {
    dimension: usize,
    inner: RwLock<FlatIndex>,
}

#[derive(Debug, Default)]
struct FlatIndex {
    entries: Vec<VectorEntry>,
    positions: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    id: String,
    vector: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct VectorFile {
    dimension: usize,
    entries: Vec<VectorEntry>,
}

impl FlatIndex {
    fn reindex(&mut self) {
        self.positions = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (entry.id.clone(), pos))
            .collect();
    }
}

impl VectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(FlatIndex::default()),
        }
    }

    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert or replace the vector of `chunk_id`
    pub fn add(&self, chunk_id: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let id = chunk_id.into();
        let mut index = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let existing = index.positions.get(&id).copied();
        match existing {
            Some(pos) => index.entries[pos].vector = vector,
            None => {
                let pos = index.entries.len();
                index.positions.insert(id.clone(), pos);
                index.entries.push(VectorEntry { id, vector });
            }
        }
        Ok(())
    }

    /// Top `limit` chunk ids by cosine similarity, best first
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f32)>> {
        if query.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let index = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut results: Vec<(String, f32)> = index
            .entries
            .iter()
            .map(|entry| (entry.id.clone(), cosine_similarity(query, &entry.vector)))
            .collect();

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    pub fn get(&self, chunk_id: &str) -> Option<Vec<f32>> {
        let index = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let pos = *index.positions.get(chunk_id)?;
        Some(index.entries[pos].vector.clone())
    }

    pub fn remove(&self, chunk_id: &str) -> bool {
        let mut index = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = index.positions.get(chunk_id).copied() else {
            return false;
        };
        index.entries.remove(pos);
        index.reindex();
        true
    }

    /// Remove many ids at once; returns how many were present
    pub fn remove_many(&self, chunk_ids: &[String]) -> usize {
        let mut index = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = index.entries.len();
        index.entries.retain(|entry| !chunk_ids.contains(&entry.id));
        let removed = before - index.entries.len();
        if removed > 0 {
            index.reindex();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut index = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        index.entries.clear();
        index.positions.clear();
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = {
            let index = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            VectorFile {
                dimension: self.dimension,
                entries: index.entries.clone(),
            }
        };
        log::debug!("Saving {} vectors to {:?}", file.entries.len(), path.as_ref());
        tokio::fs::write(path, serde_json::to_string(&file)?).await?;
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = tokio::fs::read_to_string(&path).await?;
        let file: VectorFile = serde_json::from_str(&data)?;

        let store = Self::new(file.dimension);
        for entry in file.entries {
            store.add(entry.id, entry.vector)?;
        }
        log::debug!("Loaded {} vectors from {:?}", store.len(), path.as_ref());
        Ok(store)
    }
}
