//! Embedding generation: OpenAI-compatible service and a deterministic local fallback

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use async_trait::async_trait;
use tracing::debug;

use super::{with_timeout, Embedder, Service};
use crate::config::EmbeddingSettings;
use crate::graphrag::vectors::normalize;
use crate::{Error, Result};

/// Service for generating text embeddings
pub struct EmbeddingService {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl EmbeddingService {
    /// Create a new embedding service from `OPENAI_API_KEY`
    pub fn new() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY not set".to_string()))?;
        Self::with_credentials(api_key, None)
    }

    /// Create from the `embedding` config section
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let mut service =
            Self::with_credentials(settings.api_key.clone(), Some(settings.base_url.as_str()))?;
        service.model = settings.model.clone();
        service.timeout = settings.timeout;
        Ok(service)
    }

    fn with_credentials(api_key: String, base_url: Option<&str>) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("embedding api_key is empty".to_string()));
        }

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = base_url {
            config = config.with_api_base(base.trim_end_matches('/'));
        }

        Ok(Self {
            client: OpenAIClient::with_config(config),
            model: "text-embedding-3-small".to_string(),
            timeout: Duration::from_secs(30),
        })
    }

    /// Create with custom model
    pub fn with_model(model: impl Into<String>) -> Result<Self> {
        let mut service = Self::new()?;
        service.model = model.into();
        Ok(service)
    }

    /// Generate embeddings for multiple texts in batch
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        // Empty texts are not sent; long ones are cut at a char boundary
        let processed: Vec<String> = texts
            .iter()
            .map(|t| t.trim().chars().take(8000).collect::<String>())
            .filter(|t| !t.is_empty())
            .collect();

        if processed.is_empty() {
            return Ok(vec![Vec::new(); texts.len()]);
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(processed))
            .build()
            .map_err(|e| Error::EmbeddingError(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| Error::EmbeddingError(e.to_string()))?;

        debug!(
            "Generated {} embeddings, tokens used: {}",
            response.data.len(),
            response.usage.total_tokens
        );

        // Map back to original indices (empty texts get empty vectors)
        let mut result = Vec::with_capacity(texts.len());
        let mut embed_iter = response.data.into_iter();

        for text in texts {
            if text.trim().is_empty() {
                result.push(Vec::new());
            } else if let Some(embed) = embed_iter.next() {
                result.push(embed.embedding);
            }
        }

        Ok(result)
    }

    /// Get the embedding dimension for the current model
    pub fn dimension(&self) -> usize {
        match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let batch = [text.to_string()];
        let embeddings = with_timeout(Service::Embedding, self.timeout, self.embed_batch(&batch))
            .await?;
        embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::EmbeddingError("No embedding returned".to_string()))
    }
}

/// Deterministic, fast embedding for offline/local use.
///
/// Hashes lowercase whitespace tokens and their character bigrams into a fixed
/// number of buckets, so texts without spaces still share features.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dim: usize,
}

impl LocalEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dim];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            vec[self.bucket(&token)] += 1.0;

            let chars: Vec<char> = token.chars().collect();
            for pair in chars.windows(2) {
                let bigram: String = pair.iter().collect();
                vec[self.bucket(&bigram)] += 0.5;
            }
        }

        normalize(&mut vec);
        vec
    }

    fn bucket(&self, feature: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        (hasher.finish() as usize) % self.dim
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::EmbeddingError("cannot embed empty text".to_string()));
        }
        Ok(self.embed_sync(text))
    }
}
