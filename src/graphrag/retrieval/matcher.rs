//! Entity matching: question or seed entities to graph node names.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::graphrag::partition::CommunityInfo;
use crate::graphrag::vectors::{cosine_similarity, embed_fitted, sort_by_score, top_k, Scored};
use crate::integrations::Embedder;
use crate::Result;

/// Read-only embedding tables the matcher searches.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingTables {
    /// Entity name to fitted, normalized vector
    pub entities: BTreeMap<String, Vec<f32>>,
    /// Communities with members and a usable embedding
    pub communities: BTreeMap<i64, CommunityInfo>,
    /// Isolated entities that have a stored vector
    pub isolated: Vec<String>,
}

impl EmbeddingTables {
    fn vectors<'a>(
        &'a self,
        names: &'a [String],
    ) -> impl Iterator<Item = (&'a String, &'a Vec<f32>)> + 'a {
        names
            .iter()
            .filter_map(move |n| self.entities.get(n).map(|v| (n, v)))
    }
}

pub struct EntityMatcher {
    embedder: Arc<dyn Embedder>,
    dimension: usize,
    top_n: usize,
    threshold: f32,
}

impl EntityMatcher {
    pub fn new(embedder: Arc<dyn Embedder>, dimension: usize, top_n: usize, threshold: f32) -> Self {
        Self {
            embedder,
            dimension,
            top_n: top_n.max(1),
            threshold,
        }
    }

    /// Matched entity names (order not significant).
    pub async fn match_entities(
        &self,
        tables: &EmbeddingTables,
        question: &str,
        seeds: &[String],
    ) -> Result<Vec<String>> {
        let scored = if seeds.is_empty() {
            let query = embed_fitted(self.embedder.as_ref(), question, self.dimension).await?;
            self.match_question(tables, &query)
        } else {
            self.match_seeds(tables, seeds).await
        };
        Ok(scored.into_iter().map(|s| s.name).collect())
    }

    /// Nearest entities for each seed, unioned; seeds that fail to embed are skipped.
    pub async fn match_seeds(&self, tables: &EmbeddingTables, seeds: &[String]) -> Vec<Scored> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for seed in seeds {
            let vec = match embed_fitted(self.embedder.as_ref(), seed, self.dimension).await {
                Ok(vec) => vec,
                Err(err) => {
                    warn!("Match: embedding seed '{}' failed: {}", seed, err);
                    continue;
                }
            };
            for hit in top_k(&vec, &tables.entities, self.top_n) {
                if seen.insert(hit.name.clone()) {
                    out.push(hit);
                }
            }
        }
        out
    }

    /// Community-guided search with the isolated fallback.
    pub fn match_question(&self, tables: &EmbeddingTables, query: &[f32]) -> Vec<Scored> {
        let mut communities: Vec<(i64, f32)> = tables
            .communities
            .iter()
            .map(|(id, info)| (*id, cosine_similarity(query, &info.embedding)))
            .collect();
        communities.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        communities.truncate(self.top_n);

        let mut seen = HashSet::new();
        let pool: Vec<String> = communities
            .iter()
            .flat_map(|(id, _)| tables.communities[id].nodes.iter())
            .filter(|n| tables.entities.contains_key(*n) && seen.insert(n.as_str()))
            .cloned()
            .collect();

        let mut matched = top_k(query, tables.vectors(&pool), self.top_n);
        let best = matched.first().map(|s| s.score);
        debug!(
            "Match: {} communities, pool of {}, best {:?}",
            communities.len(),
            pool.len(),
            best
        );

        if best.map_or(true, |b| b < self.threshold) {
            let floor = matched.last().map(|s| s.score);
            let isolated = top_k(query, tables.vectors(&tables.isolated), self.top_n);
            let extra: Vec<Scored> = isolated
                .into_iter()
                .filter(|s| floor.map_or(true, |f| s.score > f))
                .collect();
            if !extra.is_empty() {
                debug!("Match: {} isolated candidates merged", extra.len());
                matched.extend(extra);
                sort_by_score(&mut matched);
                matched.truncate(self.top_n);
            }
        }
        matched
    }
}
