//! Integration tests for the graphrag library
//!
//! These tests drive the public API end to end (build → partition → persist →
//! query) against in-process fakes, without network access.

mod commands;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use graphrag::{
    config::{
        CommunitySettings, Config, InferenceSettings, RetrievalSettings, StandardizationSettings,
    },
    error::{Error, Result},
    graphrag::{
        parser,
        persist::{load_community_index, load_entity_table, save_community_index, save_entity_table},
        pipeline::vectorize_entities,
        retrieval::NO_CONTEXT_PROMPT,
        BuildPipeline, Chunker, CommunityPartitioner, QueryRequest, RecallResult, RetrievalIndex,
        Triple, ISOLATED,
    },
    integrations::{LocalEmbedder, PathStore},
    prompts::{list_prompts, Prompt},
};

const DIM: usize = 64;

/// Graph store fake answering one-hop paths from an in-memory triple set.
struct MemoryStore {
    triples: Vec<Triple>,
}

#[async_trait]
impl PathStore for MemoryStore {
    async fn paths(&self, names: &[String], _max_hops: usize) -> Result<Vec<RecallResult>> {
        Ok(self
            .triples
            .iter()
            .filter(|t| names.contains(&t.subject))
            .map(|t| RecallResult::single(&t.subject, &t.predicate, &t.object))
            .collect())
    }
}

struct DownStore;

#[async_trait]
impl PathStore for DownStore {
    async fn paths(&self, _names: &[String], _max_hops: usize) -> Result<Vec<RecallResult>> {
        Err(Error::GraphStoreError("connection refused".to_string()))
    }
}

fn corpus() -> Vec<Triple> {
    vec![
        Triple::new("Paris", "capital of", "France"),
        Triple::new("paris", "located on", "Seine"),
        Triple::new("France", "member of", "European Union"),
        Triple::new("Berlin", "capital of", "Germany"),
        Triple::new("Germany", "member of", "European Union"),
        Triple::new("Tokyo", "capital of", "Japan"),
        Triple::new("Japan", "is", "Japan"),
    ]
}

fn offline_build() -> BuildPipeline {
    BuildPipeline::new(
        StandardizationSettings {
            enabled: true,
            use_llm_for_entities: false,
            fuzzy_merge: false,
        },
        InferenceSettings {
            enabled: true,
            use_llm_for_inference: false,
            apply_transitive: true,
            apply_lexical_similarity: true,
            concurrency: 2,
        },
    )
}

fn retrieval_settings() -> RetrievalSettings {
    RetrievalSettings {
        top_n: 3,
        similarity_threshold: 0.8,
        top_n_triples: 10,
        max_hops: 1,
    }
}

// ============================================================================
// Parser Tests
// ============================================================================

#[test]
fn test_parser_recovers_fenced_relaxed_json() {
    let raw = "Here you go:\n```json\n[{subject: \"Paris\", predicate: \"capital of\", object: \"France\"},]\n```";
    let value = parser::parse(raw).expect("recovered");
    let items = value.as_array().expect("array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["subject"], "Paris");
}

#[test]
fn test_parser_gives_up_on_prose() {
    assert!(parser::parse("I could not find any relationships.").is_none());
}

// ============================================================================
// Build Tests
// ============================================================================

#[tokio::test]
async fn test_build_merges_variants_and_drops_self_references() {
    let (triples, report) = offline_build().run(corpus()).await;

    let normalize = report.normalize.expect("normalize report");
    assert_eq!(normalize.self_references, 1);
    assert!(triples.iter().all(|t| t.subject != t.object));
    assert!(triples.iter().all(|t| t.subject != "paris"));
    assert!(triples
        .iter()
        .any(|t| t.subject == "Paris" && t.predicate == "located on"));
    assert_eq!(report.output, triples.len());
}

#[tokio::test]
async fn test_build_connects_components_lexically_and_transitively() {
    let (triples, _) = offline_build().run(corpus()).await;
    // Paris -> France -> European Union
    assert!(triples
        .iter()
        .any(|t| t.inferred && t.subject == "Paris" && t.object == "European Union"));
}

// ============================================================================
// Partition Tests
// ============================================================================

#[tokio::test]
async fn test_partition_marks_small_components_isolated() {
    let partitioner = CommunityPartitioner::new(
        CommunitySettings {
            min_size: 3,
            resolution: 1.0,
            seed: Some(7),
        },
        DIM,
    )
    .with_embedder(Arc::new(LocalEmbedder::new(DIM)));

    let mut triples = corpus();
    triples.push(Triple::new("Mars", "orbits", "Sun"));
    let index = partitioner.build_index(&triples).await;

    assert!(index.isolated_nodes.contains(&"Mars".to_string()));
    assert_eq!(index.assignments()["Mars"], ISOLATED);
    for info in index.communities.values() {
        assert!(!info.nodes.is_empty());
        assert_eq!(info.embedding.len(), DIM);
        assert!(!info.summary.is_empty());
    }
}

// ============================================================================
// End-to-end Tests
// ============================================================================

#[tokio::test]
async fn test_end_to_end_seeded_query() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(LocalEmbedder::new(DIM));

    let (triples, _) = offline_build().run(corpus()).await;

    let (table, failed) = vectorize_entities(&triples, embedder.as_ref(), DIM).await;
    assert_eq!(failed, 0);
    let table_path = dir.path().join("entity.csv");
    save_entity_table(&table_path, &table).unwrap();

    let index = CommunityPartitioner::new(
        CommunitySettings {
            min_size: 2,
            resolution: 1.0,
            seed: Some(1),
        },
        DIM,
    )
    .with_embedder(embedder.clone())
    .build_index(&triples)
    .await;
    let index_path = dir.path().join("community_info.json");
    save_community_index(&index_path, &index).unwrap();

    let retrieval = RetrievalIndex::from_parts(
        load_entity_table(&table_path).unwrap(),
        load_community_index(&index_path).unwrap(),
        embedder,
        Arc::new(MemoryStore { triples }),
        retrieval_settings(),
        DIM,
    );

    let mut request = QueryRequest::new("What is the capital of France?");
    request.entities = vec!["Paris".to_string()];
    request.top_n = Some(50);
    let outcome = retrieval.query(&request).await;

    assert_eq!(outcome.matched[0], "Paris");
    assert!(outcome.prompt.starts_with("Knowledge graph facts:\n1. "));
    assert!(outcome.prompt.contains("Paris capital of France"));
}

#[tokio::test]
async fn test_query_degrades_when_store_is_down() {
    let mut entities = BTreeMap::new();
    let embedder = LocalEmbedder::new(DIM);
    entities.insert("Paris".to_string(), embedder.embed_sync("Paris"));

    let retrieval = RetrievalIndex::from_parts(
        entities,
        Default::default(),
        Arc::new(embedder),
        Arc::new(DownStore),
        retrieval_settings(),
        DIM,
    );
    let mut request = QueryRequest::new("Paris?");
    request.entities = vec!["Paris".to_string()];

    let response = retrieval.answer(&request).await;
    assert_eq!(response.llm_prompt, NO_CONTEXT_PROMPT);
}

#[tokio::test]
async fn test_missing_index_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_community_index(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, Error::MissingIndex(_)));
}

// ============================================================================
// Config & Prompt Tests
// ============================================================================

#[test]
fn test_config_from_yaml_overrides_defaults() {
    let config = Config::from_yaml_str(
        "embedding:\n  provider: local\n  dimension: 32\nretrieval:\n  max_hops: 2\n",
    )
    .unwrap();
    assert_eq!(config.embedding.dimension, 32);
    assert_eq!(config.retrieval.max_hops, 2);
    assert_eq!(config.retrieval.top_n_triples, 10);
}

#[test]
fn test_prompts_have_distinct_files() {
    let prompts = list_prompts();
    let mut names: Vec<_> = prompts.iter().map(Prompt::filename).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), prompts.len());
    assert!(Prompt::ExtractionSystem.default_text().len() > 20);
}

#[test]
fn test_chunker_overlaps_words() {
    let text = (0..30).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
    let chunks = Chunker::new(10, 2).chunk(&text, "doc");
    assert!(chunks.len() >= 3);
    assert!(chunks[1].text.starts_with("w8 w9"));
}
