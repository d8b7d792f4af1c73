use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::integrations::PathStore;

/// Relation label of a recalled path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Relation {
    /// One-hop path
    Single(String),
    /// Labels of every hop, in path order
    Chain(Vec<String>),
}

impl Relation {
    pub fn text(&self) -> String {
        match self {
            Relation::Single(rel) => rel.clone(),
            Relation::Chain(chain) => chain.join("->"),
        }
    }
}

/// One path out of the matched entities, produced per query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RecallResult {
    pub head: String,
    pub tail: String,
    pub relation: Relation,
    pub hop_count: usize,
    /// Node names joined with `->`
    pub node_path: String,
}

impl RecallResult {
    pub fn single(head: impl Into<String>, relation: impl Into<String>, tail: impl Into<String>) -> Self {
        let (head, tail) = (head.into(), tail.into());
        Self {
            node_path: format!("{}->{}", head, tail),
            head,
            tail,
            relation: Relation::Single(relation.into()),
            hop_count: 1,
        }
    }

    /// Build from a traversal row: `n + 1` node names and `n` relation labels.
    pub fn from_path(node_names: Vec<String>, mut rel_chain: Vec<String>) -> Option<Self> {
        if rel_chain.is_empty() || node_names.len() != rel_chain.len() + 1 {
            return None;
        }
        let head = node_names.first()?.clone();
        let tail = node_names.last()?.clone();
        if head == tail {
            return None;
        }

        let hop_count = rel_chain.len();
        let relation = if hop_count == 1 {
            Relation::Single(rel_chain.remove(0))
        } else {
            Relation::Chain(rel_chain)
        };
        Some(Self {
            head,
            tail,
            relation,
            hop_count,
            node_path: node_names.join("->"),
        })
    }

    /// `"<head> <rel> <tail>"`, the form that gets ranked and formatted.
    pub fn text(&self) -> String {
        format!("{} {} {}", self.head, self.relation.text(), self.tail)
    }
}

/// Recalls the neighbourhood of matched entities from the graph store.
pub struct GraphRecaller {
    store: Arc<dyn PathStore>,
    max_hops: usize,
}

impl GraphRecaller {
    pub fn new(store: Arc<dyn PathStore>, max_hops: usize) -> Self {
        Self {
            store,
            max_hops: max_hops.max(1),
        }
    }

    /// Distinct paths ordered by `(hop_count, head)`; store failures yield nothing.
    pub async fn recall(&self, names: &[String]) -> Vec<RecallResult> {
        if names.is_empty() {
            return Vec::new();
        }

        let rows = match self.store.paths(names, self.max_hops).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!("Recall failed for {:?}: {}", names, err);
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut paths: Vec<RecallResult> = rows
            .into_iter()
            .filter(|p| p.head != p.tail && seen.insert(p.clone()))
            .collect();
        paths.sort_by(|a, b| a.hop_count.cmp(&b.hop_count).then_with(|| a.head.cmp(&b.head)));
        debug!("Recalled {} paths for {} entities", paths.len(), names.len());
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphrag::testing::StaticPaths;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn from_path_single_hop() {
        let path = RecallResult::from_path(names(&["Paris", "France"]), names(&["capital of"])).unwrap();
        assert_eq!(path, RecallResult::single("Paris", "capital of", "France"));
        assert_eq!(path.text(), "Paris capital of France");
    }

    #[test]
    fn from_path_chain() {
        let path = RecallResult::from_path(
            names(&["Paris", "France", "EU"]),
            names(&["capital of", "member of"]),
        )
        .unwrap();
        assert_eq!(path.hop_count, 2);
        assert_eq!(path.node_path, "Paris->France->EU");
        assert_eq!(path.text(), "Paris capital of->member of EU");
    }

    #[test]
    fn from_path_rejects_malformed_rows() {
        assert!(RecallResult::from_path(names(&["A"]), vec![]).is_none());
        assert!(RecallResult::from_path(names(&["A", "B"]), names(&["p", "q"])).is_none());
        assert!(RecallResult::from_path(names(&["A", "B", "A"]), names(&["p", "q"])).is_none());
    }

    #[tokio::test]
    async fn recall_sorts_and_dedups() {
        let store = StaticPaths {
            paths: vec![
                RecallResult::single("Paris", "capital of", "France"),
                RecallResult::from_path(names(&["Berlin", "Germany", "EU"]), names(&["in", "in"]))
                    .unwrap(),
                RecallResult::single("Berlin", "capital of", "Germany"),
                RecallResult::single("Paris", "capital of", "France"),
            ],
            fail: false,
        };
        let recaller = GraphRecaller::new(Arc::new(store), 2);
        let out = recaller.recall(&names(&["Paris", "Berlin"])).await;

        let heads: Vec<(&str, usize)> = out.iter().map(|p| (p.head.as_str(), p.hop_count)).collect();
        assert_eq!(heads, vec![("Berlin", 1), ("Paris", 1), ("Berlin", 2)]);
    }

    #[tokio::test]
    async fn recall_swallows_store_errors() {
        let recaller = GraphRecaller::new(
            Arc::new(StaticPaths {
                paths: vec![],
                fail: true,
            }),
            1,
        );
        assert!(recaller.recall(&names(&["Paris"])).await.is_empty());
    }
}
