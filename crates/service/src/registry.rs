use crate::error::{Result, ServiceError};
use codeweave_search::{CrossEncoder, Reranker};
use codeweave_vector_store::{EmbeddingConfig, EmbeddingProvider, StubEmbeddingProvider};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Embedding and reranking clients shared by one service
///
/// Providers are built once per `(provider, model, dimension)` and reused.
/// Only the stub provider can be built here; remote providers are handed
/// in with [`ClientRegistry::register_embedder`].
#[derive(Default)]
pub struct ClientRegistry {
    embedders: RwLock<HashMap<ProviderKey, Arc<dyn EmbeddingProvider>>>,
    cross_encoder: Option<Arc<dyn CrossEncoder>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProviderKey {
    provider: String,
    model_name: String,
    dimension: usize,
}

impl ProviderKey {
    fn of(config: &EmbeddingConfig) -> Self {
        Self {
            provider: config.provider.clone(),
            model_name: config.model_name.clone(),
            dimension: config.dimension,
        }
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cross_encoder(mut self, cross_encoder: Arc<dyn CrossEncoder>) -> Self {
        self.cross_encoder = Some(cross_encoder);
        self
    }

    /// Make an externally built provider available under its own config
    pub fn register_embedder(&self, provider: Arc<dyn EmbeddingProvider>) {
        let key = ProviderKey::of(provider.config());
        log::debug!("Registered embedding provider {key:?}");
        self.embedders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, provider);
    }

    /// Provider matching `config`, building the stub on first use
    pub fn embedder(&self, config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        let key = ProviderKey::of(config);
        if let Some(existing) = self
            .embedders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(existing));
        }

        if !config.is_stub() {
            return Err(ServiceError::UnsupportedProvider(config.provider.clone()));
        }
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::new(StubEmbeddingProvider::new(config.clone())?);

        let mut embedders = self.embedders.write().unwrap_or_else(PoisonError::into_inner);
        let entry = embedders.entry(key).or_insert(provider);
        Ok(Arc::clone(entry))
    }

    /// Cross-encoder reranking when enabled and available, otherwise local signals
    pub fn reranker(&self, enabled: bool) -> Reranker {
        match (&self.cross_encoder, enabled) {
            (Some(cross_encoder), true) => Reranker::with_cross_encoder(Arc::clone(cross_encoder)),
            (None, true) => Reranker::local(),
            (_, false) => Reranker::local().boost_recent(false).boost_documented(false),
        }
    }
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self
            .embedders
            .read()
            .map(|m| m.len())
            .unwrap_or_default();
        f.debug_struct("ClientRegistry")
            .field("embedders", &cached)
            .field("cross_encoder", &self.cross_encoder.is_some())
            .finish()
    }
}
