//! Relationship inference: densify the consolidated graph before partitioning.
//!
//! Steps, over the directed `subject -> objects` adjacency of the input:
//! 1. connected components (undirected, iterative DFS)
//! 2. model-proposed bridges between the largest components
//! 3. model-proposed bridges between lexically related, unconnected pairs
//!    inside the largest components
//! 4. transitive edges `A -> C` for every `A -> M -> C` without a direct edge
//! 5. lexical edges between unconnected entities sharing a long token
//! 6. deduplication by `(subject, predicate, object)`, originals winning
//!
//! Steps 2-3 need a completion model and at least two components. Each model
//! call is independent; they run concurrently up to the configured limit and
//! a failed call only loses its own proposals.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::parser;
use super::triple::{limit_predicate_length, lower_tokens, triples_from_value, Triple};
use crate::config::InferenceSettings;
use crate::integrations::{CallParams, CompletionModel};
use crate::prompts::{inference_user, within_community_user, Prompt, PromptSet};
use crate::Result;

/// Predicate of lexical-similarity edges ("associated").
pub const LEXICAL_PREDICATE: &str = "关联";
/// Predicate used when a hop has none recorded.
const DEFAULT_PREDICATE: &str = "relates to";

const CROSS_COMPONENTS: usize = 5;
const WITHIN_COMPONENTS: usize = 3;
const WITHIN_MIN_SIZE: usize = 5;
const REPRESENTATIVES: usize = 5;
const CONTEXT_TRIPLES: usize = 20;
const WITHIN_MAX_PAIRS: usize = 10;
const LEXICAL_MIN_TOKEN: usize = 4;

/// Counts gathered during inference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceReport {
    pub components: usize,
    pub bridge_requests: usize,
    pub failed_requests: usize,
    pub bridged: usize,
    pub transitive: usize,
    pub lexical: usize,
    pub output: usize,
}

/// Directed adjacency plus the undirected view used for connectivity.
pub struct Adjacency {
    directed: BTreeMap<String, BTreeSet<String>>,
    undirected: BTreeMap<String, BTreeSet<String>>,
}

impl Adjacency {
    pub fn build(triples: &[Triple]) -> Self {
        let mut directed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut undirected: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for t in triples {
            directed
                .entry(t.subject.clone())
                .or_default()
                .insert(t.object.clone());
            directed.entry(t.object.clone()).or_default();
            undirected
                .entry(t.subject.clone())
                .or_default()
                .insert(t.object.clone());
            undirected
                .entry(t.object.clone())
                .or_default()
                .insert(t.subject.clone());
        }
        Self {
            directed,
            undirected,
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = &String> {
        self.directed.keys()
    }

    /// An edge exists in either direction.
    pub fn connected(&self, a: &str, b: &str) -> bool {
        self.undirected.get(a).is_some_and(|n| n.contains(b))
    }

    /// Connected components, largest first; members sorted by name.
    pub fn components(&self) -> Vec<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut components = Vec::new();

        for start in self.undirected.keys() {
            if visited.contains(start.as_str()) {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start.as_str()];
            visited.insert(start.as_str());
            while let Some(node) = stack.pop() {
                component.push(node.to_string());
                if let Some(neighbors) = self.undirected.get(node) {
                    for next in neighbors {
                        if visited.insert(next.as_str()) {
                            stack.push(next.as_str());
                        }
                    }
                }
            }
            component.sort();
            components.push(component);
        }

        components.sort_by(|a, b| b.len().cmp(&a.len()));
        components
    }
}

/// One bridging prompt.
struct BridgeRequest {
    label: String,
    system: Prompt,
    user: String,
}

pub struct RelationshipInferencer {
    settings: InferenceSettings,
    model: Option<Arc<dyn CompletionModel>>,
    prompts: PromptSet,
    params: CallParams,
}

impl RelationshipInferencer {
    pub fn new(settings: InferenceSettings) -> Self {
        Self {
            settings,
            model: None,
            prompts: PromptSet::builtin(),
            params: CallParams::default(),
        }
    }

    pub fn with_model(
        mut self,
        model: Arc<dyn CompletionModel>,
        prompts: PromptSet,
        params: CallParams,
    ) -> Self {
        self.model = Some(model);
        self.prompts = prompts;
        self.params = params;
        self
    }

    pub async fn infer(&self, triples: Vec<Triple>) -> Vec<Triple> {
        self.infer_with_report(triples).await.0
    }

    pub async fn infer_with_report(&self, triples: Vec<Triple>) -> (Vec<Triple>, InferenceReport) {
        let mut report = InferenceReport::default();
        let graph = Adjacency::build(&triples);
        let components = graph.components();
        report.components = components.len();
        info!(
            "Inference: {} triples, {} entities, {} components",
            triples.len(),
            graph.directed.len(),
            components.len()
        );

        let mut inferred = Vec::new();

        if let Some(model) = self.model.as_ref().filter(|_| self.settings.use_llm_for_inference) {
            if components.len() >= 2 {
                let mut requests = cross_component_requests(&components, &triples);
                requests.extend(within_component_requests(&components, &graph, &triples));
                report.bridge_requests = requests.len();

                let (bridged, failed) = self.run_requests(model.as_ref(), requests).await;
                report.bridged = bridged.len();
                report.failed_requests = failed;
                inferred.extend(bridged);
            } else {
                debug!("Inference: single component, skipping bridging");
            }
        }

        if self.settings.apply_transitive {
            let transitive = transitive_edges(&graph, &triples);
            report.transitive = transitive.len();
            inferred.extend(transitive);
        }

        if self.settings.apply_lexical_similarity {
            let lexical = lexical_edges(&graph);
            report.lexical = lexical.len();
            inferred.extend(lexical);
        }

        let mut all = triples;
        all.extend(inferred);
        let result = finalize(all);
        report.output = result.len();

        info!(
            "Inference: {} bridged ({} failed requests), {} transitive, {} lexical, {} triples out",
            report.bridged, report.failed_requests, report.transitive, report.lexical, report.output
        );
        (result, report)
    }

    async fn run_requests(
        &self,
        model: &dyn CompletionModel,
        requests: Vec<BridgeRequest>,
    ) -> (Vec<Triple>, usize) {
        let results: Vec<(String, Result<Vec<Triple>>)> = stream::iter(requests)
            .map(|req| async move {
                let outcome = self.ask(model, &req).await;
                (req.label, outcome)
            })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut triples = Vec::new();
        let mut failed = 0;
        for (label, outcome) in results {
            match outcome {
                Ok(found) => {
                    debug!("Inference: {} proposed {} triples", label, found.len());
                    triples.extend(found);
                }
                Err(err) => {
                    warn!("Inference: {} failed: {}", label, err);
                    failed += 1;
                }
            }
        }
        (triples, failed)
    }

    async fn ask(&self, model: &dyn CompletionModel, req: &BridgeRequest) -> Result<Vec<Triple>> {
        let response = model
            .complete(
                self.prompts.get(req.system),
                &req.user,
                self.params.temperature,
                self.params.max_tokens,
            )
            .await?;

        let Some(value) = parser::parse(&response) else {
            warn!("Inference: {} returned no parsable JSON", req.label);
            return Ok(Vec::new());
        };
        let (found, invalid) = triples_from_value(&value);
        if invalid > 0 {
            debug!("Inference: {} had {} invalid items", req.label, invalid);
        }

        Ok(found
            .into_iter()
            .filter(|t| !t.is_self_reference())
            .map(|t| Triple::inferred(t.subject, limit_predicate_length(&t.predicate), t.object))
            .collect())
    }
}

fn triples_text<'a, I>(triples: I) -> String
where
    I: IntoIterator<Item = &'a Triple>,
{
    triples
        .into_iter()
        .map(|t| format!("{} {} {}", t.subject, t.predicate, t.object))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Up to [`CONTEXT_TRIPLES`] existing triples touching any of `entities`.
fn context_triples<'a>(triples: &'a [Triple], entities: &HashSet<&str>) -> Vec<&'a Triple> {
    triples
        .iter()
        .filter(|t| entities.contains(t.subject.as_str()) || entities.contains(t.object.as_str()))
        .take(CONTEXT_TRIPLES)
        .collect()
}

fn cross_component_requests(components: &[Vec<String>], triples: &[Triple]) -> Vec<BridgeRequest> {
    let top = &components[..components.len().min(CROSS_COMPONENTS)];
    let mut requests = Vec::new();

    for i in 0..top.len() {
        for j in (i + 1)..top.len() {
            let reps1: Vec<String> = top[i].iter().take(REPRESENTATIVES).cloned().collect();
            let reps2: Vec<String> = top[j].iter().take(REPRESENTATIVES).cloned().collect();
            let touching: HashSet<&str> = reps1.iter().chain(&reps2).map(String::as_str).collect();
            let context = triples_text(context_triples(triples, &touching));

            requests.push(BridgeRequest {
                label: format!("components {}-{}", i, j),
                system: Prompt::InferenceSystem,
                user: inference_user(&reps1, &reps2, &context),
            });
        }
    }
    requests
}

fn lexically_related(a: &str, b: &str) -> bool {
    let (la, lb) = (a.to_lowercase(), b.to_lowercase());
    if la.contains(&lb) || lb.contains(&la) {
        return true;
    }
    let tokens_a = lower_tokens(a);
    lower_tokens(b).iter().any(|t| tokens_a.contains(t))
}

fn within_component_requests(
    components: &[Vec<String>],
    graph: &Adjacency,
    triples: &[Triple],
) -> Vec<BridgeRequest> {
    let mut requests = Vec::new();

    for (idx, component) in components
        .iter()
        .filter(|c| c.len() >= WITHIN_MIN_SIZE)
        .take(WITHIN_COMPONENTS)
        .enumerate()
    {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        'scan: for i in 0..component.len() {
            for j in (i + 1)..component.len() {
                let (a, b) = (component[i].as_str(), component[j].as_str());
                if !graph.connected(a, b) && lexically_related(a, b) {
                    pairs.push((a, b));
                    if pairs.len() >= WITHIN_MAX_PAIRS {
                        break 'scan;
                    }
                }
            }
        }
        if pairs.is_empty() {
            continue;
        }

        let touching: HashSet<&str> = pairs.iter().flat_map(|(a, b)| [*a, *b]).collect();
        let context = triples_text(context_triples(triples, &touching));
        let pairs_text = pairs
            .iter()
            .map(|(a, b)| format!("{} and {}", a, b))
            .collect::<Vec<_>>()
            .join("\n");

        requests.push(BridgeRequest {
            label: format!("component {} pairs", idx),
            system: Prompt::WithinCommunitySystem,
            user: within_community_user(&pairs_text, &context),
        });
    }
    requests
}

/// `A -> C` for every `A -> M -> C` lacking a direct `A -> C` edge.
fn transitive_edges(graph: &Adjacency, triples: &[Triple]) -> Vec<Triple> {
    let mut predicates: HashMap<(&str, &str), &str> = HashMap::new();
    for t in triples {
        predicates.insert((t.subject.as_str(), t.object.as_str()), t.predicate.as_str());
    }

    let mut edges = Vec::new();
    for (subject, mids) in &graph.directed {
        for mid in mids {
            let Some(objects) = graph.directed.get(mid) else {
                continue;
            };
            for object in objects {
                if subject == object || predicates.contains_key(&(subject.as_str(), object.as_str()))
                {
                    continue;
                }
                let p1 = predicates
                    .get(&(subject.as_str(), mid.as_str()))
                    .copied()
                    .unwrap_or(DEFAULT_PREDICATE);
                let p2 = predicates
                    .get(&(mid.as_str(), object.as_str()))
                    .copied()
                    .unwrap_or(DEFAULT_PREDICATE);
                let predicate = if p1 == p2 {
                    format!("indirectly {}", p1)
                } else {
                    format!("{} via {}", p1, mid)
                };
                edges.push(Triple::inferred(
                    subject.clone(),
                    limit_predicate_length(&predicate),
                    object.clone(),
                ));
            }
        }
    }
    edges
}

/// Edges between unconnected entities whose longest shared token has at least
/// [`LEXICAL_MIN_TOKEN`] characters.
fn lexical_edges(graph: &Adjacency) -> Vec<Triple> {
    let entities: Vec<(&String, String, BTreeSet<String>)> = graph
        .entities()
        .map(|e| (e, e.to_lowercase(), lower_tokens(e)))
        .collect();

    let mut edges = Vec::new();
    for i in 0..entities.len() {
        for j in (i + 1)..entities.len() {
            let (e1, lower1, tokens1) = &entities[i];
            let (e2, lower2, tokens2) = &entities[j];
            if graph.connected(e1, e2) {
                continue;
            }

            let mut shared: Option<&String> = None;
            for token in tokens1.intersection(tokens2) {
                if shared.map_or(true, |best| token.chars().count() > best.chars().count()) {
                    shared = Some(token);
                }
            }
            let Some(token) = shared else {
                continue;
            };
            if token.chars().count() < LEXICAL_MIN_TOKEN {
                continue;
            }

            let (subject, object) = match (lower1.starts_with(token.as_str()), lower2.starts_with(token.as_str())) {
                (true, false) => (e2, e1),
                _ => (e1, e2),
            };
            edges.push(Triple::inferred(
                subject.as_str(),
                LEXICAL_PREDICATE,
                object.as_str(),
            ));
        }
    }
    edges
}

/// Collapse triples sharing `(subject, predicate, object)`, keeping first-seen
/// order; an extracted triple always replaces an inferred duplicate.
pub fn deduplicate(triples: Vec<Triple>) -> Vec<Triple> {
    let mut index: HashMap<(String, String, String), usize> = HashMap::new();
    let mut out: Vec<Triple> = Vec::with_capacity(triples.len());

    for triple in triples {
        let key = (
            triple.subject.clone(),
            triple.predicate.clone(),
            triple.object.clone(),
        );
        match index.get(&key) {
            Some(&i) => {
                if !triple.inferred && out[i].inferred {
                    out[i] = triple;
                }
            }
            None => {
                index.insert(key, out.len());
                out.push(triple);
            }
        }
    }
    out
}

/// Cap predicates, deduplicate and drop self-references.
fn finalize(triples: Vec<Triple>) -> Vec<Triple> {
    let capped = triples
        .into_iter()
        .map(|mut t| {
            t.predicate = limit_predicate_length(&t.predicate);
            t
        })
        .collect();
    deduplicate(capped)
        .into_iter()
        .filter(|t| !t.is_self_reference())
        .collect()
}
