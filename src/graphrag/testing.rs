//! Fakes for the external collaborators, used by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::retrieval::RecallResult;
use crate::integrations::{CompletionModel, Embedder, PathStore};
use crate::{Error, Result};

/// Replies with queued responses in call order; errors once the queue is empty.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String>>>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, system: &str, user: &str, _t: f32, _m: u32) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::CompletionError("script exhausted".to_string())))
    }
}

/// Replies by inspecting the prompts, so concurrent callers stay deterministic.
pub struct FnModel<F>(pub F);

#[async_trait]
impl<F> CompletionModel for FnModel<F>
where
    F: Fn(&str, &str) -> Result<String> + Send + Sync,
{
    async fn complete(&self, system: &str, user: &str, _t: f32, _m: u32) -> Result<String> {
        (self.0)(system, user)
    }
}

/// Fixed text-to-vector table; unknown texts fail like an unavailable provider.
#[derive(Default)]
pub struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
}

impl TableEmbedder {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<f32>)>,
        S: Into<String>,
    {
        Self {
            table: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| Error::EmbeddingError(format!("no vector for '{}'", text)))
    }
}

/// Returns the stored paths whose head is among the requested names.
pub struct StaticPaths {
    pub paths: Vec<RecallResult>,
    pub fail: bool,
}

#[async_trait]
impl PathStore for StaticPaths {
    async fn paths(&self, names: &[String], _max_hops: usize) -> Result<Vec<RecallResult>> {
        if self.fail {
            return Err(Error::GraphStoreError("store unavailable".to_string()));
        }
        Ok(self
            .paths
            .iter()
            .filter(|p| names.contains(&p.head))
            .cloned()
            .collect())
    }
}
