//! Standalone GraphRAG query server.
//!
//! Loads the entity table and community index once, connects to Neo4j and
//! serves `POST /graphrag`, `GET /health` and `GET /metrics`.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use graphrag::commands::serve::resolve_addr;
use graphrag::graphrag::RetrievalIndex;
use graphrag::{server, Config};

#[derive(Parser)]
#[command(name = "graphrag_server")]
#[command(about = "HTTP retrieval endpoint over the consolidated knowledge graph")]
struct Cli {
    /// Path to config.yml
    #[arg(long, env = "GRAPHRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (default: server.addr from config)
    #[arg(long, env = "GRAPHRAG_ADDR")]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("graphrag=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let addr = resolve_addr(&config, cli.addr.as_deref())?;

    info!(
        "Loading index from {} and {}",
        config.paths.entity_vectors.display(),
        config.paths.community_info.display()
    );
    let index = RetrievalIndex::init(&config).await?;

    server::serve(addr, std::sync::Arc::new(index)).await
}
