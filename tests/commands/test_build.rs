//! Tests for the offline build, vectorize, communities and export commands

use std::collections::BTreeSet;
use std::path::Path;

use graphrag::commands::{build, communities, export, vectorize};
use graphrag::graphrag::persist::{load_entity_table, load_triples, save_triples};
use graphrag::graphrag::Triple;
use graphrag::Config;

fn offline_config(dir: &Path) -> Config {
    let yaml = format!(
        r#"
llm:
  api_key: ""
embedding:
  provider: local
  dimension: 32
inference:
  use_llm_for_inference: false
community:
  min_size: 2
  seed: 3
paths:
  triples: {dir}/knowledge_graph.json
  graph: {dir}/graph.json
  entity_vectors: {dir}/entity.csv
  community_info: {dir}/community_info.json
  prompts_dir: {dir}/prompts
"#,
        dir = dir.display()
    );
    Config::from_yaml_str(&yaml).unwrap()
}

fn seed_triples(path: &Path) {
    save_triples(
        path,
        &[
            Triple::new("Ada Lovelace", "wrote notes on", "Analytical Engine"),
            Triple::new("ada lovelace", "collaborated with", "Charles Babbage"),
            Triple::new("Charles Babbage", "designed", "Analytical Engine"),
            Triple::new("Charles Babbage", "designed", "Difference Engine"),
        ],
    )
    .unwrap();
}

fn seed_chain(path: &Path) {
    save_triples(
        path,
        &[
            Triple::new("A", "knows", "B"),
            Triple::new("B", "knows", "C"),
            Triple::new("C", "knows", "D"),
        ],
    )
    .unwrap();
}

#[tokio::test]
async fn test_build_writes_graph_and_keeps_raw_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    seed_triples(&config.paths.triples);
    let raw = std::fs::read(&config.paths.triples).unwrap();

    assert!(!build::needs_model(&config));
    let report = build::run(&config, None, None).await.unwrap();
    assert_eq!(report.input, 4);

    let graph = load_triples(&config.paths.graph).unwrap();
    assert_eq!(graph.len(), report.output);
    assert!(graph.iter().all(|t| t.subject != "ada lovelace"));
    assert_eq!(std::fs::read(&config.paths.triples).unwrap(), raw);
}

#[tokio::test]
async fn test_rebuild_from_same_corpus_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    seed_chain(&config.paths.triples);
    let raw = std::fs::read(&config.paths.triples).unwrap();

    let first_report = build::run(&config, None, None).await.unwrap();
    let first = load_triples(&config.paths.graph).unwrap();
    let second_report = build::run(&config, None, None).await.unwrap();
    let second = load_triples(&config.paths.graph).unwrap();

    assert_eq!(first_report.input, 3);
    assert_eq!(second_report.input, 3);
    assert_eq!(first, second);
    assert!(first.iter().any(|t| t.inferred));
    assert!(!second.iter().any(|t| t.predicate.contains("indirectly knows via")));
    assert_eq!(std::fs::read(&config.paths.triples).unwrap(), raw);
}

#[tokio::test]
async fn test_build_refuses_to_overwrite_its_input() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    seed_chain(&config.paths.triples);
    let raw = std::fs::read(&config.paths.triples).unwrap();

    let result = build::run(&config, None, Some(config.paths.triples.as_path())).await;
    assert!(result.is_err());
    assert_eq!(std::fs::read(&config.paths.triples).unwrap(), raw);
}

#[tokio::test]
async fn test_build_honors_explicit_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    seed_chain(&config.paths.triples);

    let output = dir.path().join("alt").join("graph.json");
    build::run(&config, None, Some(output.as_path())).await.unwrap();
    assert!(output.exists());
    assert!(!config.paths.graph.exists());
}

#[tokio::test]
async fn test_vectorize_and_communities_write_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    seed_triples(&config.paths.graph);

    let (embedded, failed) = vectorize::run(&config).await.unwrap();
    assert_eq!(failed, 0);
    assert_eq!(embedded, 5);
    let table = load_entity_table(&config.paths.entity_vectors).unwrap();
    assert!(table.values().all(|v| v.len() == 32));

    let index = communities::run(&config).await.unwrap();
    assert!(config.paths.community_info.exists());
    let members: usize = index.communities.values().map(|c| c.nodes.len()).sum();
    assert_eq!(members + index.isolated_nodes.len(), 5);
}

#[test]
fn test_export_csv_writes_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    seed_triples(&config.paths.graph);

    let output = dir.path().join("triples.csv");
    let rows = export::run(&config, &output).unwrap();
    assert_eq!(rows, 4);

    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("subject,predicate,object"));
}

#[tokio::test]
async fn test_build_without_triples_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    assert!(build::run(&config, None, None).await.is_err());
}

#[tokio::test]
async fn test_downstream_steps_read_built_graph_not_raw_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    seed_triples(&config.paths.triples);

    assert!(vectorize::run(&config).await.is_err());
    assert!(export::run(&config, &dir.path().join("early.csv")).is_err());

    build::run(&config, None, None).await.unwrap();
    let graph = load_triples(&config.paths.graph).unwrap();
    let entities: BTreeSet<&str> = graph
        .iter()
        .flat_map(|t| [t.subject.as_str(), t.object.as_str()])
        .collect();
    let (embedded, _) = vectorize::run(&config).await.unwrap();
    assert_eq!(embedded, entities.len());
    assert!(!entities.contains("ada lovelace"));
}
