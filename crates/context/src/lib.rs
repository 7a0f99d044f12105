//! # Codeweave Context
//!
//! Turns knowledge-graph entities into token-budgeted markdown bundles.
//!
//! ## Features
//!
//! - **Hard token budget** - every bundle stays strictly below `max_tokens`
//! - **Task profiles** - debug, explain, extend, review and locate reorder and boost sections
//! - **Sufficiency score** - weighted coverage of the profile, used to decide escalation
//! - **Intent classification** - weighted regex voting over the query text
//!
//! ## Example
//!
//! ```no_run
//! use codeweave_context::{classify_query, ContextSynthesizer, TokenCounter};
//! use codeweave_graph::KnowledgeStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = KnowledgeStore::load("codeweave_knowledge.json")?;
//! let synth = ContextSynthesizer::new(&store, TokenCounter::new()?, 2000);
//! let (task, _confidence) = classify_query("why does checkout crash?");
//! let bundle = synth.synthesize_with_task("shop.py::checkout", task)?;
//! println!("{}", bundle.context_text);
//! # Ok(())
//! # }
//! ```

mod classifier;
mod error;
mod synthesizer;
mod task;
mod tokens;

pub use classifier::classify_query;
pub use error::{ContextError, Result};
pub use synthesizer::{ContextBundle, ContextSynthesizer, DEFAULT_MAX_TOKENS, SECTION_SEPARATOR};
pub use task::{ContextSection, TaskType};
pub use tokens::TokenCounter;
