//! Entity normalization: canonical names for variants of the same entity.
//!
//! Grouping is exact on a normalized key (lowercase word tokens, stopwords
//! removed). Two optional passes build on it: fuzzy merging of keys by token
//! subset or stem overlap, and model-driven resolution of the entity list.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::parser;
use super::triple::{grouping_key, limit_predicate_length, Triple};
use crate::config::StandardizationSettings;
use crate::integrations::{CallParams, CompletionModel};
use crate::prompts::{entity_resolution_user, Prompt, PromptSet};

/// Entity lists larger than this are cut to their most frequent names before resolution.
const RESOLUTION_MAX_ENTITIES: usize = 1000;
const RESOLUTION_SAMPLE: usize = 100;
/// Stem length used by fuzzy merging.
const STEM_LEN: usize = 4;
const STEM_OVERLAP: f64 = 0.9;

/// Counts gathered during normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub input: usize,
    pub invalid: usize,
    pub entities_before: usize,
    pub entities_after: usize,
    pub merged_groups: usize,
    pub self_references: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EntityNormalizer {
    fuzzy_merge: bool,
}

impl EntityNormalizer {
    pub fn new(settings: &StandardizationSettings) -> Self {
        Self {
            fuzzy_merge: settings.fuzzy_merge,
        }
    }

    pub fn with_fuzzy_merge(mut self, enabled: bool) -> Self {
        self.fuzzy_merge = enabled;
        self
    }

    pub fn normalize(&self, triples: Vec<Triple>) -> Vec<Triple> {
        self.normalize_with_report(triples).0
    }

    pub fn normalize_with_report(&self, triples: Vec<Triple>) -> (Vec<Triple>, NormalizeReport) {
        let mut report = NormalizeReport {
            input: triples.len(),
            ..Default::default()
        };

        let valid: Vec<Triple> = triples
            .into_iter()
            .filter_map(|mut t| {
                t.subject = t.subject.trim().to_string();
                t.predicate = t.predicate.trim().to_string();
                t.object = t.object.trim().to_string();
                (!t.subject.is_empty() && !t.predicate.is_empty() && !t.object.is_empty())
                    .then_some(t)
            })
            .collect();
        report.invalid = report.input - valid.len();
        if report.invalid > 0 {
            warn!("Normalize: filtered out {} invalid triples", report.invalid);
        }
        if valid.is_empty() {
            warn!("Normalize: no valid triples to standardize");
            return (Vec::new(), report);
        }

        let stats = EntityStats::collect(&valid);
        report.entities_before = stats.surface.len();

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for lower in stats.order.iter() {
            let key = grouping_key(lower);
            if key.is_empty() {
                continue;
            }
            groups.entry(key).or_default().push(lower.clone());
        }

        if self.fuzzy_merge {
            groups = fuzzy_merge_groups(groups, &stats);
        }

        let mut mapping: HashMap<String, String> = HashMap::new();
        for variants in groups.values().filter(|v| v.len() > 1) {
            report.merged_groups += 1;
            let canonical = stats.canonical(variants);
            debug!("Normalize: {:?} -> {}", variants, canonical);
            for variant in variants {
                mapping.insert(variant.clone(), canonical.clone());
            }
        }

        let mapped: Vec<Triple> = valid
            .into_iter()
            .map(|mut t| {
                if let Some(canonical) = mapping.get(&t.subject.to_lowercase()) {
                    t.subject = canonical.clone();
                }
                if let Some(canonical) = mapping.get(&t.object.to_lowercase()) {
                    t.object = canonical.clone();
                }
                t.predicate = limit_predicate_length(&t.predicate);
                t
            })
            .collect();

        let (result, removed) = remove_self_references(mapped);
        report.self_references = removed;
        report.entities_after = super::triple::unique_entities(&result).len();

        info!(
            "Normalize: {} groups merged, {} -> {} entities, {} self-references removed",
            report.merged_groups, report.entities_before, report.entities_after, removed
        );
        (result, report)
    }
}

/// Drop triples whose subject equals their object.
pub fn remove_self_references(triples: Vec<Triple>) -> (Vec<Triple>, usize) {
    let before = triples.len();
    let kept: Vec<Triple> = triples
        .into_iter()
        .filter(|t| !t.is_self_reference())
        .collect();
    let removed = before - kept.len();
    if removed > 0 {
        info!("Removed {} self-referencing triples", removed);
    }
    (kept, removed)
}

/// Frequency and surface forms of lowercased entity names.
struct EntityStats {
    /// Lowercase names in first-seen order.
    order: Vec<String>,
    frequency: HashMap<String, usize>,
    /// First original spelling of each lowercase name.
    surface: HashMap<String, String>,
}

impl EntityStats {
    fn collect(triples: &[Triple]) -> Self {
        let mut stats = Self {
            order: Vec::new(),
            frequency: HashMap::new(),
            surface: HashMap::new(),
        };
        for t in triples {
            for name in [&t.subject, &t.object] {
                let lower = name.to_lowercase();
                *stats.frequency.entry(lower.clone()).or_insert(0) += 1;
                if !stats.surface.contains_key(&lower) {
                    stats.surface.insert(lower.clone(), name.clone());
                    stats.order.push(lower);
                }
            }
        }
        stats
    }

    fn frequency(&self, lower: &str) -> usize {
        self.frequency.get(lower).copied().unwrap_or(0)
    }

    /// Most frequent variant, then the shortest, then the lexicographically first;
    /// returned in its original spelling.
    fn canonical(&self, variants: &[String]) -> String {
        let best = variants
            .iter()
            .min_by(|a, b| {
                self.frequency(b)
                    .cmp(&self.frequency(a))
                    .then_with(|| a.chars().count().cmp(&b.chars().count()))
                    .then_with(|| a.cmp(b))
            })
            .cloned()
            .unwrap_or_default();
        self.surface.get(&best).cloned().unwrap_or(best)
    }
}

/// Merge grouping keys whose tokens are a strict subset of another key's, or
/// whose token stems overlap almost completely.
fn fuzzy_merge_groups(
    groups: BTreeMap<String, Vec<String>>,
    stats: &EntityStats,
) -> BTreeMap<String, Vec<String>> {
    let keys: Vec<String> = groups.keys().cloned().collect();
    let tokens: Vec<Vec<&str>> = keys.iter().map(|k| k.split(' ').collect()).collect();
    let stems: Vec<Vec<String>> = tokens
        .iter()
        .map(|ts| {
            let mut s: Vec<String> = ts.iter().map(|t| t.chars().take(STEM_LEN).collect()).collect();
            s.sort();
            s.dedup();
            s
        })
        .collect();
    let weight: Vec<usize> = keys
        .iter()
        .map(|k| groups[k].iter().map(|v| stats.frequency(v)).sum())
        .collect();

    let mut parent: Vec<usize> = (0..keys.len()).collect();
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..keys.len() {
        for j in 0..keys.len() {
            if i == j {
                continue;
            }
            let strict_subset = tokens[i].len() < tokens[j].len()
                && tokens[i].iter().all(|t| tokens[j].contains(t));
            if !(strict_subset || stem_jaccard(&stems[i], &stems[j]) > STEM_OVERLAP) {
                continue;
            }
            let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
            if ri == rj {
                continue;
            }
            // The longer, more frequent key survives as the root.
            let keep_j = (tokens[rj].len(), weight[rj]) >= (tokens[ri].len(), weight[ri]);
            if keep_j {
                parent[ri] = rj;
            } else {
                parent[rj] = ri;
            }
            debug!("Normalize: fuzzy merge '{}' ~ '{}'", keys[i], keys[j]);
        }
    }

    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (i, key) in keys.iter().enumerate() {
        let root = find(&mut parent, i);
        merged
            .entry(keys[root].clone())
            .or_default()
            .extend(groups[key].iter().cloned());
    }
    merged
}

fn stem_jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.iter().filter(|s| b.contains(s)).count();
    let union = a.len() + b.len() - inter;
    inter as f64 / union as f64
}

/// Ask the completion model to standardize entity names, then apply its mapping.
///
/// Any failure leaves the triples as they were.
pub async fn resolve_with_model(
    triples: Vec<Triple>,
    model: &dyn CompletionModel,
    prompts: &PromptSet,
    params: CallParams,
) -> Vec<Triple> {
    let entities = resolution_candidates(&triples);
    if entities.len() < 2 {
        return triples;
    }

    let response = match model
        .complete(
            prompts.get(Prompt::EntityResolutionSystem),
            &entity_resolution_user(&entities),
            params.temperature,
            params.max_tokens,
        )
        .await
    {
        Ok(text) => text,
        Err(err) => {
            warn!("Normalize: entity resolution call failed: {}", err);
            return triples;
        }
    };

    let Some(Value::Object(groups)) = parser::parse(&response) else {
        warn!("Normalize: entity resolution returned no JSON object");
        return triples;
    };

    let mut mapping: HashMap<String, String> = HashMap::new();
    for (standard, variants) in groups {
        let Some(variants) = variants.as_array() else {
            continue;
        };
        for variant in variants.iter().filter_map(Value::as_str) {
            if variant != standard {
                mapping.insert(variant.to_lowercase(), standard.clone());
            }
        }
    }
    info!("Normalize: model resolved {} entity variants", mapping.len());

    let mapped = triples
        .into_iter()
        .map(|mut t| {
            if let Some(standard) = mapping.get(&t.subject.to_lowercase()) {
                t.subject = standard.clone();
            }
            if let Some(standard) = mapping.get(&t.object.to_lowercase()) {
                t.object = standard.clone();
            }
            t
        })
        .collect();
    remove_self_references(mapped).0
}

/// Entity names sent for resolution, most frequent first when the list is large.
fn resolution_candidates(triples: &[Triple]) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for t in triples {
        for name in [&t.subject, &t.object] {
            match index.get(name.as_str()) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    index.insert(name.as_str(), counts.len());
                    counts.push((name.clone(), 1));
                }
            }
        }
    }

    if counts.len() > RESOLUTION_MAX_ENTITIES {
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts.truncate(RESOLUTION_SAMPLE);
    }
    counts.into_iter().map(|(name, _)| name).collect()
}
