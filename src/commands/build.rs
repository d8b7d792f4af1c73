//! `graphrag build`: normalize and infer over the raw corpus into a separate graph file.

use std::path::Path;

use anyhow::{bail, Result};
use tracing::warn;

use crate::config::Config;
use crate::graphrag::persist::{load_triples, save_triples};
use crate::graphrag::{BuildPipeline, BuildReport};
use crate::integrations::CallParams;

/// Whether any enabled stage asks for the completion model.
pub fn needs_model(config: &Config) -> bool {
    (config.standardization.enabled && config.standardization.use_llm_for_entities)
        || (config.inference.enabled && config.inference.use_llm_for_inference)
}

/// Recompute the graph from `input` (default `paths.triples`) into `output`
/// (default `paths.graph`). The input file is never written.
pub async fn run(
    config: &Config,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<BuildReport> {
    let input = input.unwrap_or(config.paths.triples.as_path());
    let output = output.unwrap_or(config.paths.graph.as_path());
    if same_file(input, output) {
        bail!(
            "build output {} would overwrite its input; set paths.graph or --output",
            output.display()
        );
    }
    let triples = load_triples(input)?;

    let mut pipeline = BuildPipeline::from_config(config);
    if needs_model(config) {
        match super::optional_completion_model(config) {
            Some(model) => {
                pipeline = pipeline.with_model(
                    model,
                    super::prompt_set(config),
                    CallParams::from(&config.llm),
                );
            }
            None => warn!("Build: no LLM credentials, model-backed steps are skipped"),
        }
    }

    let (triples, report) = pipeline.run(triples).await;
    save_triples(output, &triples)?;

    println!(
        "Built {} triples ({} inferred) from {} -> {}",
        report.output,
        report.inferred,
        report.input,
        output.display()
    );
    if let Some(normalize) = &report.normalize {
        println!(
            "Entities: {} -> {} ({} self-references removed)",
            normalize.entities_before, normalize.entities_after, normalize.self_references
        );
    }
    Ok(report)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
