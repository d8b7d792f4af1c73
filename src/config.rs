//! Configuration for the build pipeline and the query server
//!
//! Loads configuration from config.yml, resolving `${VAR}` placeholders from the
//! environment (a `.env` file is loaded first when present).

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default constants (fallback if config.yml not found)
pub const CONFIG_FILE: &str = "config.yml";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_NEO4J_URI: &str = "bolt://localhost:7687";
pub const DEFAULT_NEO4J_USER: &str = "neo4j";
pub const EMBEDDING_DIM: usize = 128;
pub const MIN_COMMUNITY_SIZE: usize = 5;
pub const MATCH_TOP_N: usize = 3;
pub const SIMILARITY_THRESHOLD: f32 = 0.8;
pub const TOP_N_TRIPLES: usize = 10;
pub const CHUNK_SIZE: usize = 500;
pub const CHUNK_OVERLAP: usize = 50;

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    llm: Option<YamlLlm>,
    embedding: Option<YamlEmbedding>,
    neo4j: Option<YamlNeo4j>,
    standardization: Option<YamlStandardization>,
    inference: Option<YamlInference>,
    community: Option<YamlCommunity>,
    retrieval: Option<YamlRetrieval>,
    extraction: Option<YamlExtraction>,
    paths: Option<YamlPaths>,
    server: Option<YamlServer>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlLlm {
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlEmbedding {
    provider: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    dimension: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlNeo4j {
    uri: Option<String>,
    user: Option<String>,
    password: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlStandardization {
    enabled: Option<bool>,
    use_llm_for_entities: Option<bool>,
    fuzzy_merge: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlInference {
    enabled: Option<bool>,
    use_llm_for_inference: Option<bool>,
    apply_transitive: Option<bool>,
    apply_lexical_similarity: Option<bool>,
    concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlCommunity {
    min_size: Option<usize>,
    resolution: Option<f64>,
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlRetrieval {
    top_n: Option<usize>,
    similarity_threshold: Option<f32>,
    top_n_triples: Option<usize>,
    max_hops: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlExtraction {
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlPaths {
    triples: Option<String>,
    graph: Option<String>,
    entity_vectors: Option<String>,
    community_info: Option<String>,
    prompts_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlServer {
    addr: Option<String>,
}

/// Completion model settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_retries: u32,
}

/// Which embedding backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    OpenAi,
    Local,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    /// Fixed dimension every stored or compared vector is fitted to.
    pub dimension: usize,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Neo4jSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StandardizationSettings {
    pub enabled: bool,
    pub use_llm_for_entities: bool,
    pub fuzzy_merge: bool,
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub enabled: bool,
    pub use_llm_for_inference: bool,
    pub apply_transitive: bool,
    pub apply_lexical_similarity: bool,
    /// Maximum number of bridging prompts in flight at once.
    pub concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct CommunitySettings {
    pub min_size: usize,
    pub resolution: f64,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub top_n: usize,
    pub similarity_threshold: f32,
    pub top_n_triples: usize,
    pub max_hops: usize,
}

#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    /// Raw extracted corpus; `extract` appends, `build` only reads.
    pub triples: PathBuf,
    /// Consolidated graph written by `build`.
    pub graph: PathBuf,
    pub entity_vectors: PathBuf,
    pub community_info: PathBuf,
    pub prompts_dir: PathBuf,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub neo4j: Neo4jSettings,
    pub standardization: StandardizationSettings,
    pub inference: InferenceSettings,
    pub community: CommunitySettings,
    pub retrieval: RetrievalSettings,
    pub extraction: ExtractionSettings,
    pub paths: PathSettings,
    pub server_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_yaml(YamlConfig::default())
    }
}

impl Config {
    /// Load configuration from config.yml (current or parent directory) or use defaults
    pub fn new() -> Self {
        Self::load_from_file(CONFIG_FILE)
            .or_else(|_| Self::load_from_file(Path::new("..").join(CONFIG_FILE)))
            .unwrap_or_else(|_| {
                Self::load_dotenv();
                Self::default()
            })
    }

    /// Load from an explicit path when given; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::new()),
        }
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let yaml: YamlConfig = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;
        Ok(Self::from_yaml(yaml))
    }

    /// Resolve a value: a `${VAR}` placeholder is replaced by the env var, then `env_key` is
    /// consulted as a fallback when the value is absent or unresolved.
    fn resolve_env_string(value: Option<String>, env_key: &str) -> String {
        if let Some(ref v) = value {
            if let Some(var_name) = v.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
                if let Ok(env_val) = std::env::var(var_name) {
                    return env_val;
                }
                return std::env::var(env_key).unwrap_or_default();
            }
            return v.clone();
        }
        std::env::var(env_key).unwrap_or_default()
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        let llm = yaml.llm.unwrap_or_default();
        let embedding = yaml.embedding.unwrap_or_default();
        let neo4j = yaml.neo4j.unwrap_or_default();
        let standardization = yaml.standardization.unwrap_or_default();
        let inference = yaml.inference.unwrap_or_default();
        let community = yaml.community.unwrap_or_default();
        let retrieval = yaml.retrieval.unwrap_or_default();
        let extraction = yaml.extraction.unwrap_or_default();
        let paths = yaml.paths.unwrap_or_default();
        let server = yaml.server.unwrap_or_default();

        let llm_api_key = Self::resolve_env_string(llm.api_key, "OPENAI_API_KEY");
        let llm_base_url = llm
            .base_url
            .map(|v| Self::resolve_env_string(Some(v), "OPENAI_BASE_URL"))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        // Embedding credentials default to the completion endpoint's.
        let embedding_api_key = match embedding.api_key {
            Some(v) => Self::resolve_env_string(Some(v), "OPENAI_API_KEY"),
            None => llm_api_key.clone(),
        };
        let embedding_base_url = embedding
            .base_url
            .map(|v| Self::resolve_env_string(Some(v), "OPENAI_BASE_URL"))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| llm_base_url.clone());
        let provider = match embedding.provider.as_deref() {
            Some("local") => EmbeddingProvider::Local,
            _ => EmbeddingProvider::OpenAi,
        };

        let neo4j_uri = Self::resolve_env_string(neo4j.uri, "NEO4J_URI");
        let neo4j_user = Self::resolve_env_string(neo4j.user, "NEO4J_USER");

        Self {
            llm: LlmSettings {
                model: llm.model.unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                api_key: llm_api_key,
                base_url: llm_base_url,
                temperature: llm.temperature.unwrap_or(0.2),
                max_tokens: llm.max_tokens.unwrap_or(2048),
                timeout: Duration::from_secs(llm.timeout_secs.unwrap_or(60)),
                max_retries: llm.max_retries.unwrap_or(3).max(1),
            },
            embedding: EmbeddingSettings {
                provider,
                model: embedding
                    .model
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
                api_key: embedding_api_key,
                base_url: embedding_base_url,
                dimension: embedding.dimension.unwrap_or(EMBEDDING_DIM).max(1),
                timeout: Duration::from_secs(embedding.timeout_secs.unwrap_or(30)),
            },
            neo4j: Neo4jSettings {
                uri: if neo4j_uri.is_empty() {
                    DEFAULT_NEO4J_URI.to_string()
                } else {
                    neo4j_uri
                },
                user: if neo4j_user.is_empty() {
                    DEFAULT_NEO4J_USER.to_string()
                } else {
                    neo4j_user
                },
                password: Self::resolve_env_string(neo4j.password, "NEO4J_PASSWORD"),
                timeout: Duration::from_secs(neo4j.timeout_secs.unwrap_or(30)),
            },
            standardization: StandardizationSettings {
                enabled: standardization.enabled.unwrap_or(true),
                use_llm_for_entities: standardization.use_llm_for_entities.unwrap_or(false),
                fuzzy_merge: standardization.fuzzy_merge.unwrap_or(false),
            },
            inference: InferenceSettings {
                enabled: inference.enabled.unwrap_or(true),
                use_llm_for_inference: inference.use_llm_for_inference.unwrap_or(true),
                apply_transitive: inference.apply_transitive.unwrap_or(true),
                apply_lexical_similarity: inference.apply_lexical_similarity.unwrap_or(true),
                concurrency: inference.concurrency.unwrap_or(4).max(1),
            },
            community: CommunitySettings {
                min_size: community.min_size.unwrap_or(MIN_COMMUNITY_SIZE),
                resolution: community.resolution.unwrap_or(1.0),
                seed: community.seed,
            },
            retrieval: RetrievalSettings {
                top_n: retrieval.top_n.unwrap_or(MATCH_TOP_N).max(1),
                similarity_threshold: retrieval
                    .similarity_threshold
                    .unwrap_or(SIMILARITY_THRESHOLD),
                top_n_triples: retrieval.top_n_triples.unwrap_or(TOP_N_TRIPLES),
                max_hops: retrieval.max_hops.unwrap_or(1).max(1),
            },
            extraction: ExtractionSettings {
                chunk_size: extraction.chunk_size.unwrap_or(CHUNK_SIZE),
                chunk_overlap: extraction.chunk_overlap.unwrap_or(CHUNK_OVERLAP),
            },
            paths: PathSettings {
                triples: PathBuf::from(
                    paths
                        .triples
                        .unwrap_or_else(|| "data/knowledge_graph.json".to_string()),
                ),
                graph: PathBuf::from(
                    paths
                        .graph
                        .unwrap_or_else(|| "data/graph.json".to_string()),
                ),
                entity_vectors: PathBuf::from(
                    paths
                        .entity_vectors
                        .unwrap_or_else(|| "data/entity.csv".to_string()),
                ),
                community_info: PathBuf::from(
                    paths
                        .community_info
                        .unwrap_or_else(|| "data/community_info.json".to_string()),
                ),
                prompts_dir: paths
                    .prompts_dir
                    .map(PathBuf::from)
                    .unwrap_or_else(crate::prompts::prompts_dir),
            },
            server_addr: server.addr.unwrap_or_else(|| "0.0.0.0:8000".to_string()),
        }
    }

    /// API key for the completion endpoint; missing credentials are fatal.
    pub fn llm_api_key(&self) -> Result<&str> {
        if self.llm.api_key.trim().is_empty() {
            return Err(Error::Config(
                "llm.api_key is not set (OPENAI_API_KEY)".to_string(),
            ));
        }
        Ok(&self.llm.api_key)
    }

    /// Password for the graph store; missing credentials are fatal.
    pub fn neo4j_password(&self) -> Result<&str> {
        if self.neo4j.password.is_empty() {
            return Err(Error::Config(
                "neo4j.password is not set (NEO4J_PASSWORD)".to_string(),
            ));
        }
        Ok(&self.neo4j.password)
    }
}
