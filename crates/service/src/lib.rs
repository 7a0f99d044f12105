//! # Codeweave Service
//!
//! One session object over a saved knowledge store and retrieval index.
//!
//! [`KnowledgeService`] owns its configuration and its embedding and
//! reranking clients ([`ClientRegistry`]); nothing is held in process
//! globals, so two services with different configs can coexist.
//!
//! ## Retrieval
//!
//! [`KnowledgeService::retrieve_context_for_query`] answers a free-form
//! question in four steps:
//!
//! 1. classify the query into a task type (or take the caller's override)
//! 2. pick entities through hybrid search, falling back to name matching
//! 3. synthesize task-ordered context for each entity under a shared budget
//! 4. score sufficiency and flag results that need escalation
//!
//! ```no_run
//! use codeweave_service::{AppConfig, ClientRegistry, KnowledgeService, RetrievalOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = KnowledgeService::new(AppConfig::load(None)?, ClientRegistry::new())?;
//!     let result = service
//!         .retrieve_context_for_query("why does checkout fail on empty carts", RetrievalOptions::default())
//!         .await;
//!     println!("{} ({:.2})", result.task_type, result.sufficiency_score);
//!     println!("{}", result.context_text);
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod registry;
mod retrieval;
mod service;

pub use config::{AppConfig, PathSettings, RetrievalSettings, SearchSettings, DEFAULT_CONFIG_FILE};
pub use error::{Result, ServiceError};
pub use registry::ClientRegistry;
pub use retrieval::{
    extract_keywords, Evidence, RetrievalMode, RetrievalOptions, RetrievalResult, SelectedEntity,
    MAX_ENTITY_TOKENS, MIN_ENTITY_TOKENS,
};
pub use service::{
    AnalyzeReport, EntitySummary, KnowledgeService, ServiceStats, WatchSession, DEFAULT_IMPACT_DEPTH,
    MAX_IMPACT_DEPTH,
};
