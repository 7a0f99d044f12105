use crate::embeddings::EmbeddingConfig;
use crate::error::{Result, VectorStoreError};
use crate::paths::IndexPaths;
use codeweave_chunker::ChunkingConfig;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub const MANIFEST_VERSION: &str = "1.0";

/// Settings an index was built with
///
/// Fields other than `embedding.dimension` are optional so manifests
/// written by older builds still load; absent fields are not checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: String,
    pub embedding: ManifestEmbedding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunking: Option<ManifestChunking>,
    /// Seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEmbedding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub dimension: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestChunking {
    pub max_chunk_size: usize,
    pub overlap: usize,
}

impl IndexManifest {
    pub fn new(embedding: &EmbeddingConfig, chunking: &ChunkingConfig) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            embedding: ManifestEmbedding {
                provider: Some(embedding.provider.clone()),
                model_name: Some(embedding.model_name.clone()),
                dimension: embedding.dimension,
                normalize: Some(embedding.normalize),
            },
            chunking: Some(ManifestChunking {
                max_chunk_size: chunking.max_chunk_size,
                overlap: chunking.overlap,
            }),
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs()),
        }
    }

    /// Refuse to serve an index built with incompatible embedding settings
    pub fn validate(&self, active: &EmbeddingConfig) -> Result<()> {
        let recorded = &self.embedding;
        if recorded.dimension != active.dimension {
            return Err(mismatch("dimension", recorded.dimension, active.dimension));
        }
        if let Some(provider) = &recorded.provider {
            if *provider != active.provider {
                return Err(mismatch("provider", provider, &active.provider));
            }
        }
        if let Some(model) = &recorded.model_name {
            if *model != active.model_name {
                return Err(mismatch("model_name", model, &active.model_name));
            }
        }
        if let Some(normalize) = recorded.normalize {
            if normalize != active.normalize {
                return Err(mismatch("normalize", normalize, active.normalize));
            }
        }
        Ok(())
    }

    pub async fn save(&self, paths: &IndexPaths) -> Result<()> {
        tokio::fs::create_dir_all(paths.root()).await?;
        tokio::fs::write(paths.manifest(), serde_json::to_string_pretty(self)?).await?;
        Ok(())
    }

    pub async fn load(paths: &IndexPaths) -> Result<Self> {
        let path = paths.manifest();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(VectorStoreError::IndexMissing(paths.root().to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&data)?)
    }
}

fn mismatch(field: &'static str, expected: impl ToString, actual: impl ToString) -> VectorStoreError {
    VectorStoreError::ManifestMismatch {
        field,
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn matching_config_validates() {
        let config = EmbeddingConfig::default();
        let manifest = IndexManifest::new(&config, &ChunkingConfig::default());
        assert!(manifest.validate(&config).is_ok());
        assert_eq!(manifest.version, MANIFEST_VERSION);
        assert!(manifest.created_at.is_some());
    }

    #[test]
    fn dimension_mismatch_is_always_fatal() {
        let manifest: IndexManifest =
            serde_json::from_str(r#"{"version":"1.0","embedding":{"dimension":768}}"#).unwrap();
        let err = manifest.validate(&EmbeddingConfig::default()).unwrap_err();
        match err {
            VectorStoreError::ManifestMismatch { field, expected, actual } => {
                assert_eq!(field, "dimension");
                assert_eq!(expected, "768");
                assert_eq!(actual, "384");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn absent_fields_are_not_checked() {
        let manifest: IndexManifest =
            serde_json::from_str(r#"{"version":"1.0","embedding":{"dimension":384}}"#).unwrap();
        let config = EmbeddingConfig {
            provider: "someone-else".into(),
            model_name: "other-model".into(),
            normalize: false,
            ..EmbeddingConfig::default()
        };
        assert!(manifest.validate(&config).is_ok());
    }

    #[test]
    fn recorded_model_must_match() {
        let manifest = IndexManifest::new(&EmbeddingConfig::default(), &ChunkingConfig::default());
        let config = EmbeddingConfig {
            model_name: "other-model".into(),
            ..EmbeddingConfig::default()
        };
        let err = manifest.validate(&config).unwrap_err();
        assert!(matches!(err, VectorStoreError::ManifestMismatch { field: "model_name", .. }));
        assert!(err.to_string().contains("Rebuild the index"));
    }

    #[tokio::test]
    async fn missing_manifest_reports_index_missing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path().join("nothing-here"));
        let err = IndexManifest::load(&paths).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::IndexMissing(_)));
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path().join("index"));
        let manifest = IndexManifest::new(&EmbeddingConfig::default(), &ChunkingConfig::default());
        manifest.save(&paths).await.unwrap();
        assert!(paths.exists());
        assert_eq!(IndexManifest::load(&paths).await.unwrap(), manifest);
    }
}
