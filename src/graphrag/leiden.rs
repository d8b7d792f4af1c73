//! Leiden community detection over a weighted undirected graph.
//!
//! Each level runs Louvain-style local moving (nodes visited in shuffled
//! order, moved to the neighbouring community with the best modularity gain
//! `k_i,in - γ·k_i·Σtot / 2m`), then refines every community into its
//! connected parts so no community is internally disconnected, then
//! aggregates refined communities into super-nodes. Levels repeat until the
//! refined partition stops merging anything or `max_iterations` is reached.

use std::collections::{HashMap, VecDeque};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Gains below this count as no improvement.
const GAIN_EPSILON: f64 = 1e-12;
/// Upper bound on local-moving sweeps per level.
const MAX_SWEEPS: usize = 64;

#[derive(Debug, Clone)]
pub struct LeidenConfig {
    /// Higher values produce more, smaller communities.
    pub resolution: f64,
    pub max_iterations: usize,
    /// Fixed seed for reproducible partitions; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for LeidenConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            max_iterations: 10,
            seed: None,
        }
    }
}

/// Sparse weighted graph for one aggregation level.
struct Level {
    adj: Vec<Vec<(usize, f64)>>,
    /// Weight of edges collapsed into the node by aggregation.
    self_w: Vec<f64>,
}

impl Level {
    fn from_edges(n: usize, edges: &[(usize, usize, f64)]) -> Self {
        let mut maps: Vec<HashMap<usize, f64>> = vec![HashMap::new(); n];
        let mut order: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &(a, b, w) in edges {
            if a == b || a >= n || b >= n || w <= 0.0 {
                continue;
            }
            for (x, y) in [(a, b), (b, a)] {
                let entry = maps[x].entry(y).or_insert_with(|| {
                    order[x].push(y);
                    0.0
                });
                *entry += w;
            }
        }
        let adj = order
            .into_iter()
            .zip(maps)
            .map(|(ids, weights)| ids.into_iter().map(|j| (j, weights[&j])).collect())
            .collect();
        Self {
            adj,
            self_w: vec![0.0; n],
        }
    }

    fn len(&self) -> usize {
        self.adj.len()
    }

    fn degree(&self, i: usize) -> f64 {
        self.adj[i].iter().map(|(_, w)| w).sum::<f64>() + 2.0 * self.self_w[i]
    }
}

pub struct Leiden {
    config: LeidenConfig,
}

impl Leiden {
    pub fn new(config: LeidenConfig) -> Self {
        Self { config }
    }

    /// Community label for each of the `n` nodes.
    ///
    /// Labels are dense, numbered by community size (largest is 0), ties
    /// broken by the smallest member index.
    pub fn detect(&self, n: usize, edges: &[(usize, usize, f64)]) -> Vec<usize> {
        if n == 0 {
            return Vec::new();
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut level = Level::from_edges(n, edges);
        let mut membership: Vec<usize> = (0..n).collect();
        let two_m: f64 = (0..level.len()).map(|i| level.degree(i)).sum();
        if two_m <= 0.0 {
            return renumber_by_size(&membership);
        }

        for _ in 0..self.config.max_iterations.max(1) {
            let communities = self.local_moving(&level, two_m, &mut rng);
            let refined = refine(&level, &communities);
            let count = refined.iter().max().map_or(0, |m| m + 1);

            for m in membership.iter_mut() {
                *m = refined[*m];
            }
            if count == level.len() {
                break;
            }
            level = aggregate(&level, &refined, count);
        }

        renumber_by_size(&membership)
    }

    fn local_moving(&self, level: &Level, two_m: f64, rng: &mut StdRng) -> Vec<usize> {
        let n = level.len();
        let degrees: Vec<f64> = (0..n).map(|i| level.degree(i)).collect();
        let mut community: Vec<usize> = (0..n).collect();
        let mut totals = degrees.clone();
        let gamma = self.config.resolution;

        let mut order: Vec<usize> = (0..n).collect();
        for _ in 0..MAX_SWEEPS {
            order.shuffle(rng);
            let mut moved = false;

            for &node in &order {
                let current = community[node];
                let k_i = degrees[node];

                let mut weight_to: HashMap<usize, f64> = HashMap::new();
                let mut candidates: Vec<usize> = Vec::new();
                for &(j, w) in &level.adj[node] {
                    let c = community[j];
                    let entry = weight_to.entry(c).or_insert_with(|| {
                        candidates.push(c);
                        0.0
                    });
                    *entry += w;
                }

                totals[current] -= k_i;
                let gain = |c: usize, totals: &[f64]| {
                    weight_to.get(&c).copied().unwrap_or(0.0) - gamma * k_i * totals[c] / two_m
                };

                let mut best = current;
                let mut best_gain = gain(current, &totals);
                for &c in &candidates {
                    let g = gain(c, &totals);
                    if g > best_gain + GAIN_EPSILON {
                        best = c;
                        best_gain = g;
                    }
                }

                totals[best] += k_i;
                if best != current {
                    community[node] = best;
                    moved = true;
                }
            }

            if !moved {
                break;
            }
        }
        community
    }
}

/// Split every community into its connected parts; returns dense labels.
fn refine(level: &Level, community: &[usize]) -> Vec<usize> {
    let n = level.len();
    let mut refined = vec![usize::MAX; n];
    let mut next = 0;

    for start in 0..n {
        if refined[start] != usize::MAX {
            continue;
        }
        refined[start] = next;
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &(j, _) in &level.adj[node] {
                if refined[j] == usize::MAX && community[j] == community[start] {
                    refined[j] = next;
                    queue.push_back(j);
                }
            }
        }
        next += 1;
    }
    refined
}

fn aggregate(level: &Level, refined: &[usize], count: usize) -> Level {
    let mut self_w = vec![0.0; count];
    let mut edges: Vec<(usize, usize, f64)> = Vec::new();

    for (i, neighbors) in level.adj.iter().enumerate() {
        let ci = refined[i];
        self_w[ci] += level.self_w[i];
        for &(j, w) in neighbors {
            let cj = refined[j];
            if ci == cj {
                // each undirected edge is listed from both ends
                self_w[ci] += w / 2.0;
            } else if i < j {
                edges.push((ci, cj, w));
            }
        }
    }

    let mut next = Level::from_edges(count, &edges);
    next.self_w = self_w;
    next
}

fn renumber_by_size(membership: &[usize]) -> Vec<usize> {
    let mut groups: HashMap<usize, (usize, usize)> = HashMap::new();
    for (node, &label) in membership.iter().enumerate() {
        let entry = groups.entry(label).or_insert((0, node));
        entry.0 += 1;
    }

    let mut ranked: Vec<(usize, usize, usize)> = groups
        .into_iter()
        .map(|(label, (size, first))| (label, size, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    let mapping: HashMap<usize, usize> = ranked
        .into_iter()
        .enumerate()
        .map(|(new, (old, _, _))| (old, new))
        .collect();
    membership.iter().map(|label| mapping[label]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Leiden {
        Leiden::new(LeidenConfig {
            seed: Some(42),
            ..LeidenConfig::default()
        })
    }

    fn clique(offset: usize, size: usize) -> Vec<(usize, usize, f64)> {
        let mut edges = Vec::new();
        for i in 0..size {
            for j in (i + 1)..size {
                edges.push((offset + i, offset + j, 1.0));
            }
        }
        edges
    }

    #[test]
    fn separates_loosely_joined_cliques() {
        let mut edges = clique(0, 6);
        edges.extend(clique(6, 6));
        edges.push((5, 6, 1.0));

        let labels = seeded().detect(12, &edges);
        assert!(labels[..6].iter().all(|&l| l == labels[0]));
        assert!(labels[6..].iter().all(|&l| l == labels[6]));
        assert_ne!(labels[0], labels[6]);
    }

    #[test]
    fn edgeless_nodes_are_singletons() {
        let labels = seeded().detect(3, &[]);
        let mut sorted = labels.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2]);
    }

    #[test]
    fn empty_graph() {
        assert!(seeded().detect(0, &[]).is_empty());
    }

    #[test]
    fn labels_are_dense_and_size_ordered() {
        let mut edges = clique(0, 3);
        edges.extend(clique(3, 7));
        let labels = seeded().detect(10, &edges);

        assert!(labels[3..].iter().all(|&l| l == 0));
        assert!(labels[..3].iter().all(|&l| l == 1));
    }

    #[test]
    fn communities_are_connected() {
        // a path plus an unrelated triangle
        let mut edges: Vec<(usize, usize, f64)> = (0..8).map(|i| (i, i + 1, 1.0)).collect();
        edges.extend(clique(9, 3));
        let labels = seeded().detect(12, &edges);
        for &node in &[9, 10, 11] {
            assert!(labels[..9].iter().all(|&l| l != labels[node]));
        }
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let mut edges = clique(0, 5);
        edges.extend(clique(5, 5));
        edges.extend([(0, 5, 1.0), (2, 7, 1.0)]);
        assert_eq!(seeded().detect(10, &edges), seeded().detect(10, &edges));
    }
}
