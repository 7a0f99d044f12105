use std::path::{Path, PathBuf};

pub const DEFAULT_INDEX_DIR: &str = ".codeweave";
pub const CHUNKS_FILE: &str = "chunks.json";
pub const VECTORS_FILE: &str = "vectors.json";
pub const MANIFEST_FILE: &str = "index_manifest.json";

/// File layout of one persisted index directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    root: PathBuf,
}

impl IndexPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<project>/.codeweave`
    #[must_use]
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(DEFAULT_INDEX_DIR))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chunks(&self) -> PathBuf {
        self.root.join(CHUNKS_FILE)
    }

    pub fn vectors(&self) -> PathBuf {
        self.root.join(VECTORS_FILE)
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// An index counts as present once its manifest is written
    pub fn exists(&self) -> bool {
        self.manifest().is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_at_index_dir() {
        let paths = IndexPaths::for_project(Path::new("/repo"));
        assert_eq!(paths.root(), Path::new("/repo/.codeweave"));
        assert_eq!(paths.chunks(), Path::new("/repo/.codeweave/chunks.json"));
        assert_eq!(paths.vectors(), Path::new("/repo/.codeweave/vectors.json"));
        assert_eq!(paths.manifest(), Path::new("/repo/.codeweave/index_manifest.json"));
        assert!(!paths.exists());
    }
}
