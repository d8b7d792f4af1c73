//! `graphrag communities`: partition the graph, summarize and embed each community.

use anyhow::Result;
use tracing::warn;

use crate::config::Config;
use crate::graphrag::persist::{load_triples, save_community_index};
use crate::graphrag::{CommunityIndex, CommunityPartitioner};
use crate::integrations::embedder_from_settings;

pub async fn run(config: &Config) -> Result<CommunityIndex> {
    let triples = load_triples(&config.paths.graph)?;
    let embedder = embedder_from_settings(&config.embedding)?;

    let mut partitioner = CommunityPartitioner::new(config.community.clone(), config.embedding.dimension)
        .with_embedder(embedder);
    match super::optional_completion_model(config) {
        Some(model) => partitioner = partitioner.with_model(model, super::prompt_set(config)),
        None => warn!("Communities: no LLM credentials, using fallback summaries"),
    }

    let index = partitioner.build_index(&triples).await;
    save_community_index(&config.paths.community_info, &index)?;

    println!(
        "{} communities, {} isolated entities -> {}",
        index.communities.len(),
        index.isolated_nodes.len(),
        config.paths.community_info.display()
    );
    Ok(index)
}
