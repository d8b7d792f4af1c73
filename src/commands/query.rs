//! `graphrag query`: one retrieval round from the command line.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::graphrag::retrieval::QueryOutcome;
use crate::graphrag::{QueryRequest, RetrievalIndex};

/// Validated request from CLI arguments; blank seeds are dropped.
pub fn build_request(
    question: &str,
    entities: &[String],
    top_n: Option<usize>,
) -> Result<QueryRequest> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }
    let mut request = QueryRequest::new(question.trim());
    request.entities = entities
        .iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();
    request.top_n = top_n.filter(|&n| n > 0);
    Ok(request)
}

pub async fn run(
    config: &Config,
    question: &str,
    entities: &[String],
    top_n: Option<usize>,
) -> Result<QueryOutcome> {
    let request = build_request(question, entities, top_n)?;
    let index = RetrievalIndex::init(config).await?;
    let outcome = index.query(&request).await;

    if !outcome.matched.is_empty() {
        eprintln!("Matched entities: {}", outcome.matched.join(", "));
    }
    println!("{}", outcome.prompt);
    Ok(outcome)
}
