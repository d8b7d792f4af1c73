//! Community partitioning of the consolidated graph.
//!
//! The undirected projection of the triple set is partitioned with Leiden;
//! communities smaller than `min_size` are dissolved and their members either
//! join the large community most of their neighbours belong to or become
//! isolated (`-1`). Every large community then gets a short model-written
//! summary and an embedding of that summary, which the matcher uses to pick
//! candidate pools at query time.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::leiden::{Leiden, LeidenConfig};
use super::triple::Triple;
use super::vectors::embed_fitted;
use crate::config::CommunitySettings;
use crate::integrations::{CompletionModel, Embedder};
use crate::prompts::{community_summary_user, Prompt, PromptSet};

/// Community id of entities absorbed by no large community.
pub const ISOLATED: i64 = -1;

const CORE_NODES: usize = 15;
const TOP_RELATIONS: usize = 8;
const SAMPLE_PATHS: usize = 3;
const PATH_STARTS: usize = 10;
const SUMMARY_TEMPERATURE: f32 = 0.2;
const SUMMARY_MAX_TOKENS: u32 = 150;
const SUMMARY_MAX_CHARS: usize = 100;

/// A summarized community as persisted in the community index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityInfo {
    pub summary: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub nodes: Vec<String>,
}

/// `{communities: {id: {summary, embedding, nodes}}, isolated_nodes: [...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityIndex {
    pub communities: BTreeMap<i64, CommunityInfo>,
    #[serde(default)]
    pub isolated_nodes: Vec<String>,
}

impl CommunityIndex {
    /// Community id of every entity, isolated ones as [`ISOLATED`].
    pub fn assignments(&self) -> BTreeMap<String, i64> {
        let mut out = BTreeMap::new();
        for (id, info) in &self.communities {
            for node in &info.nodes {
                out.insert(node.clone(), *id);
            }
        }
        for node in &self.isolated_nodes {
            out.insert(node.clone(), ISOLATED);
        }
        out
    }
}

/// Undirected simple graph over the entities; edges carry the last seen predicate.
pub struct EntityGraph {
    graph: UnGraph<String, String>,
}

impl EntityGraph {
    pub fn from_triples(triples: &[Triple]) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();

        for t in triples {
            let s = *index
                .entry(t.subject.as_str())
                .or_insert_with(|| graph.add_node(t.subject.clone()));
            let o = *index
                .entry(t.object.as_str())
                .or_insert_with(|| graph.add_node(t.object.clone()));
            if s != o {
                graph.update_edge(s, o, t.predicate.clone());
            }
        }
        Self { graph }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn name(&self, node: NodeIndex) -> &str {
        &self.graph[node]
    }

    /// Neighbours ordered by node index.
    fn neighbors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        out.sort();
        out.dedup();
        out
    }

    fn relation(&self, a: NodeIndex, b: NodeIndex) -> Option<&str> {
        self.graph
            .find_edge(a, b)
            .map(|e| self.graph[e].as_str())
    }

    fn weighted_edges(&self) -> Vec<(usize, usize, f64)> {
        self.graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), 1.0))
            .collect()
    }
}

/// Dissolve communities below `min_size`.
///
/// Members of a dissolved community join the large community holding most of
/// their neighbours (ties go to the first one met in index order), or become
/// [`ISOLATED`] when no neighbour is in a large community.
pub fn absorb_small(graph: &EntityGraph, raw: &[usize], min_size: usize) -> Vec<i64> {
    let mut sizes: HashMap<usize, usize> = HashMap::new();
    for &label in raw {
        *sizes.entry(label).or_insert(0) += 1;
    }
    let is_large = |label: usize| sizes.get(&label).copied().unwrap_or(0) >= min_size;

    // large labels keep their (size-ordered) numbering
    let mut dense: HashMap<usize, i64> = HashMap::new();
    let mut large_labels: Vec<usize> = sizes.keys().copied().filter(|&l| is_large(l)).collect();
    large_labels.sort();
    for (i, label) in large_labels.into_iter().enumerate() {
        dense.insert(label, i as i64);
    }

    (0..raw.len())
        .map(|i| {
            if let Some(&id) = dense.get(&raw[i]) {
                return id;
            }
            let mut votes: Vec<(usize, usize)> = Vec::new();
            for neighbor in graph.neighbors(NodeIndex::new(i)) {
                let label = raw[neighbor.index()];
                if !is_large(label) {
                    continue;
                }
                match votes.iter_mut().find(|(l, _)| *l == label) {
                    Some((_, count)) => *count += 1,
                    None => votes.push((label, 1)),
                }
            }
            let mut best: Option<(usize, usize)> = None;
            for (label, count) in votes {
                if best.map_or(true, |(_, c)| count > c) {
                    best = Some((label, count));
                }
            }
            best.map_or(ISOLATED, |(label, _)| dense[&label])
        })
        .collect()
}

/// Structural description of one community fed to the summary prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityProfile {
    pub core_nodes: Vec<String>,
    pub relations: Vec<String>,
    pub sample_paths: Vec<String>,
}

impl CommunityProfile {
    fn build(graph: &EntityGraph, members: &[NodeIndex], labels: &[i64], id: i64) -> Self {
        let inside = |n: NodeIndex| labels[n.index()] == id;

        let mut by_degree: Vec<(NodeIndex, usize)> = members
            .iter()
            .map(|&n| {
                let degree = graph.neighbors(n).into_iter().filter(|&m| inside(m)).count();
                (n, degree)
            })
            .collect();
        by_degree.sort_by(|a, b| b.1.cmp(&a.1));
        let core_nodes = by_degree
            .iter()
            .take(CORE_NODES)
            .map(|(n, _)| graph.name(*n).to_string())
            .collect();

        let mut relation_counts: Vec<(String, usize)> = Vec::new();
        for &n in members {
            for m in graph.neighbors(n) {
                if m <= n || !inside(m) {
                    continue;
                }
                if let Some(rel) = graph.relation(n, m) {
                    match relation_counts.iter_mut().find(|(r, _)| r == rel) {
                        Some((_, c)) => *c += 1,
                        None => relation_counts.push((rel.to_string(), 1)),
                    }
                }
            }
        }
        relation_counts.sort_by(|a, b| b.1.cmp(&a.1));
        let relations = relation_counts
            .into_iter()
            .take(TOP_RELATIONS)
            .map(|(r, _)| r)
            .collect();

        let mut sample_paths = Vec::new();
        'starts: for &start in members.iter().take(PATH_STARTS) {
            for mid in graph.neighbors(start) {
                if !inside(mid) {
                    continue;
                }
                for end in graph.neighbors(mid) {
                    if end == start || !inside(end) {
                        continue;
                    }
                    let (Some(r1), Some(r2)) = (graph.relation(start, mid), graph.relation(mid, end))
                    else {
                        continue;
                    };
                    sample_paths.push(format!(
                        "{} -{}-> {} -{}-> {}",
                        graph.name(start),
                        r1,
                        graph.name(mid),
                        r2,
                        graph.name(end)
                    ));
                    if sample_paths.len() >= SAMPLE_PATHS {
                        break 'starts;
                    }
                }
            }
        }

        Self {
            core_nodes,
            relations,
            sample_paths,
        }
    }

    /// Summary used when the model is unavailable.
    fn fallback_summary(&self) -> String {
        let names: Vec<&str> = self.core_nodes.iter().take(3).map(String::as_str).collect();
        format!("Entities around {}", names.join(", "))
    }
}

fn clean_summary(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim();
    trimmed.chars().take(SUMMARY_MAX_CHARS).collect()
}

pub struct CommunityPartitioner {
    settings: CommunitySettings,
    dimension: usize,
    model: Option<Arc<dyn CompletionModel>>,
    embedder: Option<Arc<dyn Embedder>>,
    prompts: PromptSet,
}

impl CommunityPartitioner {
    pub fn new(settings: CommunitySettings, dimension: usize) -> Self {
        Self {
            settings,
            dimension,
            model: None,
            embedder: None,
            prompts: PromptSet::builtin(),
        }
    }

    pub fn with_model(mut self, model: Arc<dyn CompletionModel>, prompts: PromptSet) -> Self {
        self.model = Some(model);
        self.prompts = prompts;
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Community label per node of `graph` (after absorption).
    pub fn assign(&self, graph: &EntityGraph) -> Vec<i64> {
        let leiden = Leiden::new(LeidenConfig {
            resolution: self.settings.resolution,
            seed: self.settings.seed,
            ..LeidenConfig::default()
        });
        let raw = leiden.detect(graph.node_count(), &graph.weighted_edges());
        absorb_small(graph, &raw, self.settings.min_size)
    }

    /// Entity name to community id, isolated entities as [`ISOLATED`].
    pub fn partition(&self, triples: &[Triple]) -> BTreeMap<String, i64> {
        let graph = EntityGraph::from_triples(triples);
        let labels = self.assign(&graph);
        labels
            .iter()
            .enumerate()
            .map(|(i, &id)| (graph.name(NodeIndex::new(i)).to_string(), id))
            .collect()
    }

    /// Partition, summarize and embed every community.
    pub async fn build_index(&self, triples: &[Triple]) -> CommunityIndex {
        let graph = EntityGraph::from_triples(triples);
        let labels = self.assign(&graph);

        let mut members: BTreeMap<i64, Vec<NodeIndex>> = BTreeMap::new();
        let mut isolated_nodes = Vec::new();
        for (i, &id) in labels.iter().enumerate() {
            let node = NodeIndex::new(i);
            if id == ISOLATED {
                isolated_nodes.push(graph.name(node).to_string());
            } else {
                members.entry(id).or_default().push(node);
            }
        }
        info!(
            "Communities: {} nodes, {} edges, {} communities, {} isolated",
            graph.node_count(),
            graph.edge_count(),
            members.len(),
            isolated_nodes.len()
        );

        let mut communities = BTreeMap::new();
        let mut failed_embeddings = 0;
        for (id, nodes) in members {
            let profile = CommunityProfile::build(&graph, &nodes, &labels, id);
            let summary = self.summarize(id, &profile).await;
            let embedding = self.embed_summary(id, &summary).await;
            if embedding.is_empty() {
                failed_embeddings += 1;
            }
            debug!("Communities: {} ({} nodes): {}", id, nodes.len(), summary);

            communities.insert(
                id,
                CommunityInfo {
                    summary,
                    embedding,
                    nodes: nodes.iter().map(|&n| graph.name(n).to_string()).collect(),
                },
            );
        }
        if failed_embeddings > 0 {
            warn!(
                "Communities: {} summaries could not be embedded",
                failed_embeddings
            );
        }

        CommunityIndex {
            communities,
            isolated_nodes,
        }
    }

    async fn summarize(&self, id: i64, profile: &CommunityProfile) -> String {
        let Some(model) = &self.model else {
            return profile.fallback_summary();
        };
        let user = community_summary_user(&profile.core_nodes, &profile.relations, &profile.sample_paths);
        match model
            .complete(
                self.prompts.get(Prompt::CommunitySummarySystem),
                &user,
                SUMMARY_TEMPERATURE,
                SUMMARY_MAX_TOKENS,
            )
            .await
        {
            Ok(text) if !clean_summary(&text).is_empty() => clean_summary(&text),
            Ok(_) => {
                warn!("Communities: empty summary for community {}", id);
                profile.fallback_summary()
            }
            Err(err) => {
                warn!("Communities: summary for community {} failed: {}", id, err);
                profile.fallback_summary()
            }
        }
    }

    async fn embed_summary(&self, id: i64, summary: &str) -> Vec<f32> {
        let Some(embedder) = &self.embedder else {
            return Vec::new();
        };
        match embed_fitted(embedder.as_ref(), summary, self.dimension).await {
            Ok(vec) => vec,
            Err(err) => {
                warn!("Communities: embedding community {} failed: {}", id, err);
                Vec::new()
            }
        }
    }
}
