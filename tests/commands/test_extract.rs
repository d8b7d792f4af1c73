//! Tests for the extract command

use std::path::Path;

use graphrag::commands::extract::{self, is_text_input, load_units};
use graphrag::graphrag::persist::{load_triples, save_triples};
use graphrag::graphrag::{Chunker, Triple};
use graphrag::Config;
use httpmock::prelude::*;
use serde_json::json;

#[test]
fn test_json_input_is_read_as_qa_pairs() {
    assert!(!is_text_input(Path::new("data/qa.json"), false));
    assert!(!is_text_input(Path::new("data/QA.JSON"), false));
    assert!(is_text_input(Path::new("data/qa.json"), true));
    assert!(is_text_input(Path::new("notes.txt"), false));
}

#[test]
fn test_load_units_from_qa_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("qa.json");
    std::fs::write(
        &path,
        r#"[
            {"question": "What is the capital of France?", "answer": "Paris."},
            {"question": "missing answer"},
            {"question": "Where is Tokyo?", "answer": "Japan."}
        ]"#,
    )
    .unwrap();

    let units = load_units(&path, false, &Chunker::new(500, 50)).unwrap();
    assert_eq!(units.len(), 2);
    assert!(units[0].text.starts_with("Question: What is the capital of France?"));
    assert!(units[0].source_ref.starts_with("qa:"));
}

#[test]
fn test_load_units_from_text_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.txt");
    let text = (0..25).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ");
    std::fs::write(&path, text).unwrap();

    let units = load_units(&path, false, &Chunker::new(10, 2)).unwrap();
    assert_eq!(units.len(), 3);
    assert_eq!(units[0].source_ref, "chunk:0");
}

#[test]
fn test_load_units_rejects_non_array_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("qa.json");
    std::fs::write(&path, r#"{"question": "q", "answer": "a"}"#).unwrap();

    assert!(load_units(&path, false, &Chunker::new(500, 50)).is_err());
}

#[tokio::test]
async fn test_extract_appends_to_raw_corpus() {
    let server = MockServer::start_async().await;
    let completion_mock = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "[{\"subject\": \"Paris\", \"predicate\": \"capital of\", \"object\": \"France\"}]"
                }
            }]
        }));
    });

    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        "llm:\n  api_key: test_key\n  base_url: {url}\n  max_retries: 1\npaths:\n  triples: {dir}/raw.json\n  graph: {dir}/graph.json\n  prompts_dir: {dir}/prompts\n",
        url = server.base_url(),
        dir = dir.path().display()
    );
    let config = Config::from_yaml_str(&yaml).unwrap();

    let existing = Triple::new("Berlin", "capital of", "Germany");
    save_triples(&config.paths.triples, &[existing.clone()]).unwrap();

    let qa = dir.path().join("qa.json");
    std::fs::write(
        &qa,
        r#"[{"question": "What is the capital of France?", "answer": "Paris."}]"#,
    )
    .unwrap();

    let report = extract::run(&config, &qa, false).await.unwrap();
    assert_eq!(report.triples, 1);
    let corpus = load_triples(&config.paths.triples).unwrap();
    assert_eq!(corpus.len(), 2);
    assert_eq!(corpus[0], existing);
    assert_eq!(corpus[1].subject, "Paris");

    // The same batch again adds nothing new.
    extract::run(&config, &qa, false).await.unwrap();
    assert_eq!(load_triples(&config.paths.triples).unwrap(), corpus);
    assert!(!config.paths.graph.exists());
    completion_mock.assert_calls(2);
}
