use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Provider name of the deterministic offline embedder
pub const STUB_PROVIDER: &str = "stub";

/// Environment switch that forces the stub provider (`stub`) or names another one
pub const EMBEDDING_MODE_ENV: &str = "CODEWEAVE_EMBEDDING_MODE";

/// Embedding provider settings, recorded in the index manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model_name: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub normalize: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: STUB_PROVIDER.to_string(),
            model_name: "stub-hash-v1".to_string(),
            dimension: 384,
            batch_size: 100,
            normalize: true,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_stub(&self) -> bool {
        self.provider == STUB_PROVIDER
    }

    /// Apply `CODEWEAVE_EMBEDDING_MODE` when it is set to a non-empty value
    #[must_use]
    pub fn with_env_override(mut self) -> Self {
        if let Ok(mode) = std::env::var(EMBEDDING_MODE_ENV) {
            let mode = mode.trim();
            if !mode.is_empty() && mode != self.provider {
                log::info!("{EMBEDDING_MODE_ENV}={mode} overrides provider '{}'", self.provider);
                self.provider = mode.to_string();
            }
        }
        self
    }
}

/// Text-to-vector capability
///
/// Remote providers live outside this workspace; they plug in by
/// implementing this trait.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn config(&self) -> &EmbeddingConfig;

    /// Embed a batch, one vector per input in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("provider returned no vector".into()))
    }
}

/// Deterministic pseudo-random embeddings keyed by a hash of the text
#[derive(Debug, Clone)]
pub struct StubEmbeddingProvider {
    config: EmbeddingConfig,
}

impl StubEmbeddingProvider {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        if config.dimension == 0 {
            return Err(VectorStoreError::EmbeddingError(
                "embedding dimension must be > 0".into(),
            ));
        }
        Ok(Self { config })
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbeddingProvider {
    fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vec = stub_embed(text, self.config.dimension);
                if self.config.normalize {
                    normalize(&mut vec);
                }
                vec
            })
            .collect())
    }
}

/// Cosine similarity; zero for empty, zero-norm or mismatched vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub(crate) fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    (0..dimension)
        .map(|_| {
            let high = (splitmix64(&mut state) >> 32) as u32;
            let unit = f32::from_bits(0x3f80_0000 | (high >> 9)) - 1.0;
            unit.mul_add(2.0, -1.0)
        })
        .collect()
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
