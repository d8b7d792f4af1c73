//! `graphrag import`: push the consolidated triple set into Neo4j.

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::graphrag::persist::load_triples;
use crate::integrations::neo4j::GraphStats;
use crate::integrations::GraphStore;

pub async fn run(config: &Config, clear: bool) -> Result<GraphStats> {
    let triples = load_triples(&config.paths.graph)?;
    config.neo4j_password()?;

    let store = GraphStore::from_settings(&config.neo4j)
        .await
        .context("failed to connect to Neo4j")?;
    store.init_schema().await?;
    if clear {
        info!("Import: clearing existing graph");
        store.clear().await?;
    }

    let imported = store.import_triples(&triples).await?;
    let stats = store.stats().await?;
    println!(
        "Imported {} triples; graph now has {} entities, {} relations",
        imported, stats.entity_count, stats.relation_count
    );
    Ok(stats)
}
