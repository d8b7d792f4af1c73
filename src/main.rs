//! GraphRAG CLI - main entry point
//!
//! `extract` appends to the raw corpus at `paths.triples`; `build` recomputes
//! `paths.graph` from it. Later steps read the built graph, and `query` and
//! `serve` read their artifacts.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use graphrag::{commands, metrics, Config};
use tracing::warn;

#[derive(Parser)]
#[command(name = "graphrag")]
#[command(about = "Knowledge-graph consolidation and retrieval", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config.yml (default: ./config.yml, then ../config.yml)
    #[arg(long, env = "GRAPHRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract triples from a QA JSON file or a plain text file
    Extract {
        /// Input file (JSON array of {question, answer}, or text)
        #[arg(short, long)]
        input: PathBuf,

        /// Treat the input as plain text and chunk it
        #[arg(long, default_value_t = false)]
        text: bool,
    },

    /// Normalize entities and infer relationships
    Build {
        /// Raw triples JSON (default: paths.triples)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Consolidated graph JSON (default: paths.graph)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Partition the graph into communities with summaries and embeddings
    Communities,

    /// Embed every entity into the entity table
    Vectorize,

    /// Export triples as CSV
    ExportCsv {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Load triples into Neo4j
    Import {
        /// Delete existing entities first
        #[arg(long, default_value_t = false)]
        clear: bool,
    },

    /// Build the context prompt for a question
    Query {
        /// Question text
        #[arg(short, long)]
        question: String,

        /// Seed entity names (repeatable); skips question matching
        #[arg(short, long = "entity")]
        entities: Vec<String>,

        /// Maximum facts in the prompt
        #[arg(long)]
        top_n: Option<usize>,
    },

    /// Start the HTTP query server
    Serve {
        /// Listen address (default: server.addr)
        #[arg(long, env = "GRAPHRAG_ADDR")]
        addr: Option<String>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Extract { .. } => "extract",
            Commands::Build { .. } => "build",
            Commands::Communities => "communities",
            Commands::Vectorize => "vectorize",
            Commands::ExportCsv { .. } => "export_csv",
            Commands::Import { .. } => "import",
            Commands::Query { .. } => "query",
            Commands::Serve { .. } => "serve",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("graphrag=info".parse()?))
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let config = Config::load(cli.config.as_deref())?;

    let command_name = cli.command.name();
    metrics::record_command_start(command_name);
    let start = Instant::now();

    let result = execute_command(&config, cli.command).await;

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());

    result
}

async fn execute_command(config: &Config, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Extract { input, text } => {
            commands::extract::run(config, &input, text).await?;
        }
        Commands::Build { input, output } => {
            commands::build::run(config, input.as_deref(), output.as_deref()).await?;
        }
        Commands::Communities => {
            commands::communities::run(config).await?;
        }
        Commands::Vectorize => {
            commands::vectorize::run(config).await?;
        }
        Commands::ExportCsv { output } => {
            commands::export::run(config, &output)?;
        }
        Commands::Import { clear } => {
            commands::import::run(config, clear).await?;
        }
        Commands::Query {
            question,
            entities,
            top_n,
        } => {
            commands::query::run(config, &question, &entities, top_n).await?;
        }
        Commands::Serve { addr } => {
            commands::serve::run(config, addr.as_deref()).await?;
        }
    }

    Ok(())
}
