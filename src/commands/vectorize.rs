//! `graphrag vectorize`: embed every entity into the entity table.

use anyhow::Result;

use crate::config::Config;
use crate::graphrag::persist::{load_triples, save_entity_table};
use crate::graphrag::pipeline::vectorize_entities;
use crate::integrations::embedder_from_settings;

/// Returns `(embedded, failed)`.
pub async fn run(config: &Config) -> Result<(usize, usize)> {
    let triples = load_triples(&config.paths.graph)?;
    let embedder = embedder_from_settings(&config.embedding)?;

    let (table, failed) =
        vectorize_entities(&triples, embedder.as_ref(), config.embedding.dimension).await;
    save_entity_table(&config.paths.entity_vectors, &table)?;

    println!(
        "Embedded {} entities ({} failed) -> {}",
        table.len(),
        failed,
        config.paths.entity_vectors.display()
    );
    Ok((table.len(), failed))
}
