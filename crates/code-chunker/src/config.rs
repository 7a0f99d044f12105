use serde::{Deserialize, Serialize};

/// Configuration for entity chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub max_chunk_size: usize,

    /// Characters shared by consecutive windows of an oversized entity
    pub overlap: usize,

    /// Prepend the entity signature to its content
    pub include_signatures: bool,

    /// Prepend the quoted docstring to its content
    pub include_docstrings: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            overlap: 100,
            include_signatures: true,
            include_docstrings: true,
        }
    }
}

impl ChunkingConfig {
    /// Window advance between consecutive chunks
    #[must_use]
    pub const fn step(&self) -> usize {
        self.max_chunk_size - self.overlap
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_size == 0 {
            return Err("max_chunk_size must be > 0".to_string());
        }

        if self.overlap >= self.max_chunk_size {
            return Err(format!(
                "overlap ({}) must be smaller than max_chunk_size ({})",
                self.overlap, self.max_chunk_size
            ));
        }

        Ok(())
    }
}
