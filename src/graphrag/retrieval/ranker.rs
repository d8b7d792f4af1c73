use std::cmp::Ordering;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::debug;

use super::recall::RecallResult;
use crate::graphrag::vectors::{cosine_similarity, embed_fitted};
use crate::integrations::Embedder;
use crate::Result;

/// Candidate embeddings requested at once.
const EMBED_CONCURRENCY: usize = 8;

/// Orders recalled paths by similarity to the question.
pub struct RelevanceRanker {
    embedder: Arc<dyn Embedder>,
    dimension: usize,
}

impl RelevanceRanker {
    pub fn new(embedder: Arc<dyn Embedder>, dimension: usize) -> Self {
        Self {
            embedder,
            dimension,
        }
    }

    pub async fn rank(
        &self,
        question: &str,
        candidates: Vec<RecallResult>,
        top_n: usize,
    ) -> Result<Vec<RecallResult>> {
        let query = embed_fitted(self.embedder.as_ref(), question, self.dimension).await?;
        Ok(self.rank_with_query(&query, candidates, top_n).await)
    }

    /// Rank against an already-embedded question; candidates that fail to embed are dropped.
    pub async fn rank_with_query(
        &self,
        query: &[f32],
        candidates: Vec<RecallResult>,
        top_n: usize,
    ) -> Vec<RecallResult> {
        let total = candidates.len();
        let embedder = self.embedder.as_ref();
        let dimension = self.dimension;

        let scored: Vec<Option<(RecallResult, f32)>> = stream::iter(candidates)
            .map(|candidate| async move {
                let text = candidate.text();
                match embed_fitted(embedder, &text, dimension).await {
                    Ok(vec) => Some((candidate, cosine_similarity(query, &vec))),
                    Err(err) => {
                        debug!("Rank: skipping '{}': {}", text, err);
                        None
                    }
                }
            })
            .buffered(EMBED_CONCURRENCY)
            .collect()
            .await;

        let mut scored: Vec<(RecallResult, f32)> = scored.into_iter().flatten().collect();
        if scored.len() < total {
            debug!("Rank: {} of {} candidates skipped", total - scored.len(), total);
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(top_n);
        scored.into_iter().map(|(candidate, _)| candidate).collect()
    }
}
