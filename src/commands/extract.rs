//! `graphrag extract`: LLM triple extraction from QA pairs or plain text.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::graphrag::extractor::{load_qa_file, ExtractionReport, ExtractionUnit, TripleExtractor};
use crate::graphrag::persist::append_triples;
use crate::graphrag::Chunker;
use crate::integrations::CallParams;

/// Whether `path` should be read as plain text rather than a QA JSON array.
pub fn is_text_input(path: &Path, force_text: bool) -> bool {
    if force_text {
        return true;
    }
    !matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref(),
        Some("json")
    )
}

/// Read `input` into extraction units.
pub fn load_units(input: &Path, as_text: bool, chunker: &Chunker) -> Result<Vec<ExtractionUnit>> {
    if is_text_input(input, as_text) {
        let text = std::fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", input.display()))?;
        let source = input.display().to_string();
        let chunks = chunker.chunk(&text, source);
        info!("Extract: {} chunks from {}", chunks.len(), input.display());
        Ok(ExtractionUnit::from_chunks(&chunks))
    } else {
        let pairs = load_qa_file(input)?;
        info!("Extract: {} QA pairs from {}", pairs.len(), input.display());
        Ok(ExtractionUnit::from_qa(&pairs))
    }
}

pub async fn run(config: &Config, input: &Path, as_text: bool) -> Result<ExtractionReport> {
    let chunker = Chunker::from_settings(&config.extraction);
    let units = load_units(input, as_text, &chunker)?;

    let model = super::completion_model(config)?;
    let extractor = TripleExtractor::new(
        model,
        super::prompt_set(config),
        CallParams::from(&config.llm),
    );
    let (triples, report) = extractor.extract_all(&units).await;

    let corpus = append_triples(&config.paths.triples, &triples)?;
    println!(
        "Extracted {} triples from {} units ({} failed, {} invalid items) -> {} ({} total)",
        report.triples,
        report.units,
        report.failed_units,
        report.invalid_items,
        config.paths.triples.display(),
        corpus
    );
    Ok(report)
}
