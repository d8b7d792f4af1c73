//! Query-time retrieval over the persisted index.
//!
//! A query runs four read-only stages: match entities, recall their
//! neighbourhood from the graph store, rank the recalled paths against the
//! question, and format the survivors into a context prompt. External
//! failures in any stage degrade to fewer facts, never to an error.

pub mod format;
pub mod matcher;
pub mod ranker;
pub mod recall;

pub use format::{format_prompt, NO_CONTEXT_PROMPT};
pub use matcher::{EmbeddingTables, EntityMatcher};
pub use ranker::RelevanceRanker;
pub use recall::{GraphRecaller, RecallResult, Relation};

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::partition::CommunityIndex;
use super::persist::{load_community_index, load_entity_table};
use super::vectors::embed_fitted;
use crate::config::{Config, RetrievalSettings};
use crate::integrations::{embedder_from_settings, Embedder, GraphStore, PathStore};
use crate::{metrics, Result};

/// Body of a retrieval request.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub top_n: Option<usize>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            entities: Vec::new(),
            top_n: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub llm_prompt: String,
}

/// Everything a query produced, for callers that want more than the prompt.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub matched: Vec<String>,
    pub recalled: usize,
    pub ranked: Vec<RecallResult>,
    pub prompt: String,
}

/// Embedding tables plus the external handles, built once and shared by all queries.
pub struct RetrievalIndex {
    tables: EmbeddingTables,
    embedder: Arc<dyn Embedder>,
    matcher: EntityMatcher,
    recaller: GraphRecaller,
    ranker: RelevanceRanker,
    settings: RetrievalSettings,
    dimension: usize,
}

impl RetrievalIndex {
    /// Load the persisted index and connect to the configured collaborators.
    ///
    /// Missing artifacts or credentials are fatal here.
    pub async fn init(config: &Config) -> Result<Self> {
        let entities = load_entity_table(&config.paths.entity_vectors)?;
        let communities = load_community_index(&config.paths.community_info)?;
        let embedder = embedder_from_settings(&config.embedding)?;
        let store = GraphStore::from_settings(&config.neo4j).await?;

        Ok(Self::from_parts(
            entities,
            communities,
            embedder,
            Arc::new(store),
            config.retrieval.clone(),
            config.embedding.dimension,
        ))
    }

    pub fn from_parts(
        entities: BTreeMap<String, Vec<f32>>,
        index: CommunityIndex,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn PathStore>,
        settings: RetrievalSettings,
        dimension: usize,
    ) -> Self {
        let total = index.communities.len();
        let communities: BTreeMap<_, _> = index
            .communities
            .into_iter()
            .filter(|(_, info)| !info.nodes.is_empty() && !info.embedding.is_empty())
            .collect();
        if communities.len() < total {
            warn!(
                "Retrieval: ignoring {} communities without members or embedding",
                total - communities.len()
            );
        }

        let mut seen = HashSet::new();
        let isolated: Vec<String> = index
            .isolated_nodes
            .into_iter()
            .filter(|n| entities.contains_key(n) && seen.insert(n.clone()))
            .collect();

        info!(
            "Retrieval: {} entity vectors, {} communities, {} isolated",
            entities.len(),
            communities.len(),
            isolated.len()
        );

        Self {
            tables: EmbeddingTables {
                entities,
                communities,
                isolated,
            },
            matcher: EntityMatcher::new(
                embedder.clone(),
                dimension,
                settings.top_n,
                settings.similarity_threshold,
            ),
            recaller: GraphRecaller::new(store, settings.max_hops),
            ranker: RelevanceRanker::new(embedder.clone(), dimension),
            embedder,
            settings,
            dimension,
        }
    }

    pub fn tables(&self) -> &EmbeddingTables {
        &self.tables
    }

    pub async fn match_entities(&self, question: &str, seeds: &[String]) -> Vec<String> {
        match self.matcher.match_entities(&self.tables, question, seeds).await {
            Ok(names) => names,
            Err(err) => {
                warn!("Retrieval: matching failed: {}", err);
                Vec::new()
            }
        }
    }

    pub async fn query(&self, request: &QueryRequest) -> QueryOutcome {
        let started = Instant::now();
        let top_n = request.top_n.unwrap_or(self.settings.top_n_triples).max(1);

        let query_vec = match embed_fitted(self.embedder.as_ref(), &request.question, self.dimension).await {
            Ok(vec) => Some(vec),
            Err(err) => {
                warn!("Retrieval: embedding question failed: {}", err);
                None
            }
        };

        let matched = if !request.entities.is_empty() {
            self.matcher
                .match_seeds(&self.tables, &request.entities)
                .await
                .into_iter()
                .map(|s| s.name)
                .collect()
        } else if let Some(vec) = &query_vec {
            self.matcher
                .match_question(&self.tables, vec)
                .into_iter()
                .map(|s| s.name)
                .collect()
        } else {
            Vec::new()
        };

        let recalled = self.recaller.recall(&matched).await;
        let recalled_count = recalled.len();
        let ranked = match &query_vec {
            Some(vec) => self.ranker.rank_with_query(vec, recalled, top_n).await,
            None => recalled.into_iter().take(top_n).collect(),
        };
        let prompt = format_prompt(&ranked);

        let elapsed = started.elapsed();
        metrics::record_query_duration(elapsed);
        info!(
            "Retrieval: {} matched, {} recalled, {} ranked in {:?}",
            matched.len(),
            recalled_count,
            ranked.len(),
            elapsed
        );

        QueryOutcome {
            matched,
            recalled: recalled_count,
            ranked,
            prompt,
        }
    }

    pub async fn answer(&self, request: &QueryRequest) -> QueryResponse {
        QueryResponse {
            llm_prompt: self.query(request).await.prompt,
        }
    }
}
