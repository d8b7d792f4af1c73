//! Batch build: normalize and infer over the whole accumulated triple set.
//!
//! Stages run strictly one after the other; each run recomputes everything
//! from its input, nothing is updated incrementally.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use super::inferencer::{InferenceReport, RelationshipInferencer};
use super::normalizer::{resolve_with_model, EntityNormalizer, NormalizeReport};
use super::triple::{top_predicates, unique_entities, Triple};
use super::vectors::embed_fitted;
use crate::config::{Config, InferenceSettings, StandardizationSettings};
use crate::integrations::{CallParams, CompletionModel, Embedder};
use crate::metrics;
use crate::prompts::PromptSet;

const REPORTED_PREDICATES: usize = 5;
const VECTORIZE_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub input: usize,
    pub normalize: Option<NormalizeReport>,
    pub inference: Option<InferenceReport>,
    pub top_predicates_before: Vec<(String, usize)>,
    pub top_predicates_after: Vec<(String, usize)>,
    pub inferred: usize,
    pub output: usize,
}

pub struct BuildPipeline {
    standardization: StandardizationSettings,
    inference: InferenceSettings,
    model: Option<Arc<dyn CompletionModel>>,
    prompts: PromptSet,
    params: CallParams,
}

impl BuildPipeline {
    pub fn new(standardization: StandardizationSettings, inference: InferenceSettings) -> Self {
        Self {
            standardization,
            inference,
            model: None,
            prompts: PromptSet::builtin(),
            params: CallParams::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.standardization.clone(), config.inference.clone())
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

    pub async fn run(&self, triples: Vec<Triple>) -> (Vec<Triple>, BuildReport) {
        let mut report = BuildReport {
            input: triples.len(),
            ..Default::default()
        };
        let mut triples = triples;

        if self.standardization.enabled {
            let (normalized, normalize_report) = EntityNormalizer::new(&self.standardization)
                .normalize_with_report(triples);
            info!(
                "Standardization: {} -> {} triples, {} -> {} unique entities",
                normalize_report.input,
                normalized.len(),
                normalize_report.entities_before,
                normalize_report.entities_after
            );
            triples = normalized;
            report.normalize = Some(normalize_report);

            if self.standardization.use_llm_for_entities {
                match &self.model {
                    Some(model) => {
                        triples =
                            resolve_with_model(triples, model.as_ref(), &self.prompts, self.params)
                                .await;
                        info!(
                            "Standardization: {} unique entities after resolution",
                            unique_entities(&triples).len()
                        );
                    }
                    None => warn!("Standardization: entity resolution requested without a model"),
                }
            }
        }

        if self.inference.enabled {
            report.top_predicates_before = top_predicates(&triples, REPORTED_PREDICATES);
            log_predicates("before inference", &report.top_predicates_before);

            let mut inferencer = RelationshipInferencer::new(self.inference.clone());
            if let Some(model) = &self.model {
                inferencer = inferencer.with_model(model.clone(), self.prompts.clone(), self.params);
            }
            let (inferred, inference_report) = inferencer.infer_with_report(triples).await;
            triples = inferred;
            report.inference = Some(inference_report);

            report.top_predicates_after = top_predicates(&triples, REPORTED_PREDICATES);
            log_predicates("after inference", &report.top_predicates_after);
        }

        report.inferred = triples.iter().filter(|t| t.inferred).count();
        report.output = triples.len();
        metrics::set_last_build_triples(report.output);
        info!(
            "Build: {} triples ({} inferred) from {} input",
            report.output, report.inferred, report.input
        );
        (triples, report)
    }
}

fn log_predicates(stage: &str, predicates: &[(String, usize)]) {
    info!("Top {} predicates {}:", predicates.len(), stage);
    for (predicate, count) in predicates {
        info!("  - {}: {}", predicate, count);
    }
}

/// Embed every unique entity, fitted to `dimension`. Returns the table and the failure count.
pub async fn vectorize_entities(
    triples: &[Triple],
    embedder: &dyn Embedder,
    dimension: usize,
) -> (BTreeMap<String, Vec<f32>>, usize) {
    let entities = unique_entities(triples);
    let results: Vec<(String, crate::Result<Vec<f32>>)> = stream::iter(entities)
        .map(|name| async move {
            let vec = embed_fitted(embedder, &name, dimension).await;
            (name, vec)
        })
        .buffered(VECTORIZE_CONCURRENCY)
        .collect()
        .await;

    let mut table = BTreeMap::new();
    let mut failed = 0;
    for (name, result) in results {
        match result {
            Ok(vec) => {
                table.insert(name, vec);
            }
            Err(err) => {
                warn!("Vectorize: '{}' skipped: {}", name, err);
                failed += 1;
            }
        }
    }
    info!("Vectorize: {} entities embedded, {} failed", table.len(), failed);
    (table, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphrag::testing::{ScriptedModel, TableEmbedder};

    fn standardization() -> StandardizationSettings {
        StandardizationSettings {
            enabled: true,
            use_llm_for_entities: false,
            fuzzy_merge: false,
        }
    }

    fn inference() -> InferenceSettings {
        InferenceSettings {
            enabled: true,
            use_llm_for_inference: false,
            apply_transitive: true,
            apply_lexical_similarity: true,
            concurrency: 1,
        }
    }

    #[tokio::test]
    async fn build_normalizes_then_infers() {
        let pipeline = BuildPipeline::new(standardization(), inference());
        let (triples, report) = pipeline
            .run(vec![
                Triple::new("The Alice", "knows", "Bob"),
                Triple::new("alice", "knows", "Bob"),
                Triple::new("Bob", "knows", "Carol"),
                Triple::new("Carol", "is", "The Carol"),
            ])
            .await;

        assert_eq!(report.input, 4);
        assert_eq!(report.normalize.as_ref().map(|r| r.self_references), Some(1));
        assert!(triples.iter().any(|t| t.inferred && t.predicate == "indirectly knows"));
        assert!(triples.iter().all(|t| t.subject != t.object));
        assert_eq!(report.top_predicates_before[0].0, "knows");
        assert_eq!(report.inferred, triples.iter().filter(|t| t.inferred).count());
    }

    #[tokio::test]
    async fn disabled_stages_pass_through() {
        let pipeline = BuildPipeline::new(
            StandardizationSettings {
                enabled: false,
                ..standardization()
            },
            InferenceSettings {
                enabled: false,
                ..inference()
            },
        );
        let input = vec![Triple::new("A", "p", "B"), Triple::new("B", "p", "C")];
        let (out, report) = pipeline.run(input.clone()).await;
        assert_eq!(out, input);
        assert!(report.normalize.is_none() && report.inference.is_none());
    }

    #[tokio::test]
    async fn entity_resolution_uses_the_model() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(
            r#"{"New York City": ["NYC", "New York"]}"#.to_string(),
        )]));
        let pipeline = BuildPipeline::new(
            StandardizationSettings {
                use_llm_for_entities: true,
                ..standardization()
            },
            InferenceSettings {
                enabled: false,
                ..inference()
            },
        )
        .with_model(model.clone(), PromptSet::builtin(), CallParams::default());

        let (out, _) = pipeline
            .run(vec![
                Triple::new("NYC", "located in", "USA"),
                Triple::new("New York", "has", "subway"),
            ])
            .await;
        assert_eq!(model.call_count(), 1);
        assert!(out.iter().all(|t| t.subject == "New York City"));
    }

    #[tokio::test]
    async fn vectorize_skips_failed_entities() {
        let embedder = TableEmbedder::new([("Paris", vec![3.0, 4.0]), ("France", vec![1.0, 0.0])]);
        let triples = vec![
            Triple::new("Paris", "capital of", "France"),
            Triple::new("Paris", "twinned with", "Rome"),
        ];
        let (table, failed) = vectorize_entities(&triples, &embedder, 3).await;
        assert_eq!(failed, 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table["Paris"], vec![0.6, 0.8, 0.0]);
    }
}
