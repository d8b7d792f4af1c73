//! Command implementations
//!
//! Each module corresponds to a subcommand of the `graphrag` CLI.

pub mod build;
pub mod communities;
pub mod export;
pub mod extract;
pub mod import;
pub mod query;
pub mod serve;
pub mod vectorize;

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::integrations::{CompletionModel, OpenAIClient};
use crate::prompts::PromptSet;

// Re-export commonly used types
pub use build::run as build_run;
pub use extract::{load_units, run as extract_run};
pub use query::{build_request, run as query_run};

/// Completion model from the `llm` section; a missing API key is fatal.
pub fn completion_model(config: &Config) -> Result<Arc<dyn CompletionModel>> {
    config.llm_api_key()?;
    Ok(Arc::new(OpenAIClient::from_settings(&config.llm)?))
}

/// Completion model when credentials are present, `None` otherwise.
pub fn optional_completion_model(config: &Config) -> Option<Arc<dyn CompletionModel>> {
    if config.llm_api_key().is_err() {
        return None;
    }
    OpenAIClient::from_settings(&config.llm)
        .ok()
        .map(|client| Arc::new(client) as Arc<dyn CompletionModel>)
}

/// Prompt set with overrides from the configured prompts directory.
pub fn prompt_set(config: &Config) -> PromptSet {
    PromptSet::load(&config.paths.prompts_dir)
}
