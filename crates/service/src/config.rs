use crate::error::{Result, ServiceError};
use codeweave_chunker::ChunkingConfig;
use codeweave_graph::DEFAULT_STORE_FILE;
use codeweave_vector_store::{EmbeddingConfig, DEFAULT_INDEX_DIR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "codeweave.toml";

/// Application settings, read from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub search: SearchSettings,
    pub retrieval: RetrievalSettings,
    /// Bundles scoring below this should be escalated to an external model
    pub sufficiency_threshold: f64,
    pub paths: PathSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Dense weight in rank fusion; 0 is purely lexical
    pub alpha: f32,
    pub rerank: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub max_tokens: usize,
    pub limit_entities: usize,
    pub expand_deps: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Knowledge store snapshot (a directory resolves to the default file name)
    pub store: PathBuf,
    pub index_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            search: SearchSettings::default(),
            retrieval: RetrievalSettings::default(),
            sufficiency_threshold: 0.8,
            paths: PathSettings::default(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            rerank: true,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_tokens: 6000,
            limit_entities: 3,
            expand_deps: true,
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            store: PathBuf::from(DEFAULT_STORE_FILE),
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
        }
    }
}

impl AppConfig {
    /// Explicit path, then `./codeweave.toml`, then defaults
    ///
    /// A file that exists but does not parse is an error. The embedding
    /// provider may be overridden through `CODEWEAVE_EMBEDDING_MODE`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    Self::from_file(local)?
                } else {
                    log::debug!("No {DEFAULT_CONFIG_FILE} found, using defaults");
                    Self::default()
                }
            }
        };
        Ok(config.with_env_overrides())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| ServiceError::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let config = Self::from_toml_str(&raw).map_err(|message| ServiceError::Config {
            path: path.to_path_buf(),
            message,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> std::result::Result<Self, String> {
        let config: Self = toml::from_str(raw).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.embedding = self.embedding.with_env_override();
        self
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.search.alpha) {
            return Err(format!("search.alpha must be within [0, 1], got {}", self.search.alpha));
        }
        if self.retrieval.limit_entities == 0 {
            return Err("retrieval.limit_entities must be at least 1".to_string());
        }
        self.chunking.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
sufficiency_threshold = 0.6

[search]
alpha = 0.25

[embedding]
dimension = 64
"#,
        )
        .unwrap();

        assert_eq!(config.sufficiency_threshold, 0.6);
        assert_eq!(config.search.alpha, 0.25);
        assert!(config.search.rerank);
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.embedding.provider, "stub");
        assert_eq!(config.retrieval, RetrievalSettings::default());
        assert_eq!(config.chunking, ChunkingConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(AppConfig::from_toml_str("[search]\nalpha = 1.5\n").is_err());
        assert!(AppConfig::from_toml_str("[retrieval]\nlimit_entities = 0\n").is_err());
        assert!(AppConfig::from_toml_str("[chunking]\nmax_chunk_size = 10\noverlap = 10\n").is_err());
        assert!(AppConfig::from_toml_str("sufficiency_threshold = \"high\"").is_err());
    }

    #[test]
    fn explicit_broken_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("codeweave.toml");
        std::fs::write(&path, "[search\nalpha = ").unwrap();

        let err = AppConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ServiceError::Config { .. }));
        assert!(AppConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
