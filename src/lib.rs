//! GraphRAG: knowledge-graph consolidation and retrieval
//!
//! This library provides tools to:
//! - Extract (subject, predicate, object) triples from QA pairs or text with an LLM
//! - Recover structured output from malformed model responses
//! - Normalize entity names and infer missing relationships
//! - Partition the entity graph into communities with summaries and embeddings
//! - Answer questions with a context prompt built from multi-hop graph paths
//! - Serve retrieval over HTTP and expose Prometheus metrics

pub mod config;
pub mod error;
pub mod graphrag;
pub mod integrations;
pub mod metrics;
pub mod prompts;
pub mod server;

// Re-export common types
pub use config::Config;
pub use error::{Error, Result};
pub use integrations::{CompletionModel, Embedder, GraphStore, OpenAIClient, PathStore};
pub use prompts::{Prompt, PromptSet};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
