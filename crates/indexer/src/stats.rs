use serde::{Deserialize, Serialize};

/// Statistics about one indexing pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of files processed
    pub files: usize,

    /// Number of chunks created
    pub chunks: usize,

    pub entities: usize,
    pub relationships: usize,

    /// Time taken in milliseconds
    pub time_ms: u64,

    /// File-scoped parse and read errors
    pub errors: Vec<String>,
}

impl IndexStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, chunks: usize) {
        self.files += 1;
        self.chunks += chunks;
    }
}

/// Outcome of re-indexing a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum FileOutcome {
    Indexed { removed: usize, added: usize },
    Unchanged,
}
