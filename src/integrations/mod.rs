//! External integrations module.
//!
//! The engine talks to three collaborators, each behind a trait so the build
//! pipeline and the retrieval engine can run against fakes in tests:
//! - [`CompletionModel`]: chat completions (OpenAI-compatible HTTP API)
//! - [`Embedder`]: text embeddings (async-openai or the local hashing embedder)
//! - [`PathStore`]: multi-hop traversal over the persisted graph (Neo4j)
//!
//! The real implementations run every request under [`with_timeout`], so a hung
//! collaborator surfaces as `Error::Timeout` and is handled like any other
//! external failure.

pub mod embeddings;
pub mod neo4j;
pub mod openai;

pub use embeddings::{EmbeddingService, LocalEmbedder};
pub use neo4j::GraphStore;
pub use openai::OpenAIClient;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{EmbeddingProvider, EmbeddingSettings, LlmSettings};
use crate::graphrag::retrieval::RecallResult;
use crate::{metrics, Error, Result};

/// Black-box completion function used by extraction, inference and community summaries.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String>;
}

/// Sampling parameters for one completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CallParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2048,
        }
    }
}

impl From<&LlmSettings> for CallParams {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

/// Text embedding function. Returned vectors have the provider's native dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Build the embedder selected by the `embedding` config section.
pub fn embedder_from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    match settings.provider {
        EmbeddingProvider::OpenAi => Ok(Arc::new(EmbeddingService::from_settings(settings)?)),
        EmbeddingProvider::Local => Ok(Arc::new(LocalEmbedder::new(settings.dimension))),
    }
}

/// Traversal query executor over the persisted graph.
#[async_trait]
pub trait PathStore: Send + Sync {
    /// All distinct paths of length `1..=max_hops` starting at any node named in `names`,
    /// ordered by `(hop_count, head)`.
    async fn paths(&self, names: &[String], max_hops: usize) -> Result<Vec<RecallResult>>;
}

/// External service label used in metrics and timeout errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Completion,
    Embedding,
    GraphStore,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Completion => "completion",
            Service::Embedding => "embedding",
            Service::GraphStore => "graph_store",
        }
    }
}

/// Run an external call under a deadline and record its outcome.
pub async fn with_timeout<T, F>(service: Service, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let result = match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: service.as_str(),
            secs: limit.as_secs(),
        }),
    };

    match &result {
        Ok(_) => metrics::record_external_call(service.as_str(), "ok"),
        Err(err) => metrics::record_external_call(service.as_str(), err.status_label()),
    }
    result
}
