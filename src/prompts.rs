//! Prompt templates for extraction, entity resolution, inference and community summaries.
//!
//! Each system prompt has a built-in default; a Markdown file with the same
//! name in the prompts directory (`prompts/` by default) replaces it, so the
//! wording can be tuned per corpus without rebuilding.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Error, Result};

/// Available prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prompt {
    /// Triple extraction, system role.
    ExtractionSystem,
    /// Triple extraction instructions; the source text is appended in a fence.
    ExtractionUser,
    /// Entity resolution, system role.
    EntityResolutionSystem,
    /// Bridging two disconnected components.
    InferenceSystem,
    /// Bridging lexically related pairs inside one component.
    WithinCommunitySystem,
    /// Community summary, system role.
    CommunitySummarySystem,
}

impl Prompt {
    /// Prompt file name (Markdown).
    pub fn filename(&self) -> &'static str {
        match self {
            Prompt::ExtractionSystem => "extraction_system.md",
            Prompt::ExtractionUser => "extraction_user.md",
            Prompt::EntityResolutionSystem => "entity_resolution_system.md",
            Prompt::InferenceSystem => "inference_system.md",
            Prompt::WithinCommunitySystem => "within_community_system.md",
            Prompt::CommunitySummarySystem => "community_summary_system.md",
        }
    }

    /// Built-in text.
    pub fn default_text(&self) -> &'static str {
        match self {
            Prompt::ExtractionSystem => EXTRACTION_SYSTEM,
            Prompt::ExtractionUser => EXTRACTION_USER,
            Prompt::EntityResolutionSystem => ENTITY_RESOLUTION_SYSTEM,
            Prompt::InferenceSystem => INFERENCE_SYSTEM,
            Prompt::WithinCommunitySystem => WITHIN_COMMUNITY_SYSTEM,
            Prompt::CommunitySummarySystem => COMMUNITY_SUMMARY_SYSTEM,
        }
    }

    /// Load the prompt from a file in `dir`.
    pub fn load_from(&self, dir: &Path) -> Result<String> {
        load_prompt(dir, self.filename())
    }
}

/// Load a prompt file by name.
pub fn load_prompt(dir: &Path, filename: &str) -> Result<String> {
    let path = dir.join(filename);
    std::fs::read_to_string(&path).map_err(|e| {
        Error::InvalidArgument(format!("Failed to load prompt {}: {}", filename, e))
    })
}

/// Locate the prompts directory relative to the working directory.
pub fn prompts_dir() -> PathBuf {
    let candidates = [
        PathBuf::from("prompts"),
        PathBuf::from("../prompts"),
        PathBuf::from("../../prompts"),
    ];

    for path in candidates {
        if path.exists() {
            return path;
        }
    }

    PathBuf::from("prompts")
}

/// All prompts.
pub fn list_prompts() -> Vec<Prompt> {
    vec![
        Prompt::ExtractionSystem,
        Prompt::ExtractionUser,
        Prompt::EntityResolutionSystem,
        Prompt::InferenceSystem,
        Prompt::WithinCommunitySystem,
        Prompt::CommunitySummarySystem,
    ]
}

/// Resolved prompt texts, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct PromptSet {
    overrides: HashMap<Prompt, String>,
}

impl PromptSet {
    /// Built-in prompts only.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Built-in prompts, replaced by any files present in `dir`.
    pub fn load(dir: &Path) -> Self {
        let mut overrides = HashMap::new();
        for prompt in list_prompts() {
            if let Ok(text) = prompt.load_from(dir) {
                if !text.trim().is_empty() {
                    debug!("Prompt override loaded: {}", prompt.filename());
                    overrides.insert(prompt, text);
                }
            }
        }
        Self { overrides }
    }

    pub fn get(&self, prompt: Prompt) -> &str {
        self.overrides
            .get(&prompt)
            .map(String::as_str)
            .unwrap_or_else(|| prompt.default_text())
    }
}

const EXTRACTION_SYSTEM: &str = "You are an advanced system specialized in knowledge extraction \
and knowledge graph generation. You identify consistent entity references and meaningful \
relationships in text. Relationship labels (predicates) must be short: at most three words.";

const EXTRACTION_USER: &str = r#"Read the text below (delimited by triple backticks) and identify every Subject-Predicate-Object relationship it states. Produce a single JSON array of objects, one per triple.

Rules:
- Entity consistency: use one name per real-world entity throughout, preferably the most complete form.
- Atomic terms: keep entities as atomic as possible; do not merge several ideas into one entity.
- Resolve pronouns to the entity they refer to when it can be identified.
- Create one triple for every pair of co-occurring terms that has a meaningful relationship.
- Predicates must be at most three words. Split longer relationships into several atomic triples.
- Reject logically invalid cross-type relationships.

Output only the JSON array, with each triple as an object containing "subject", "predicate" and "object". No commentary.

Example:
[
  {"subject": "Line 3 tunnel", "predicate": "built by", "object": "Metro Construction Co"},
  {"subject": "Line 3 tunnel", "predicate": "depth", "object": "18 m"}
]
"#;

const ENTITY_RESOLUTION_SYSTEM: &str = "You are an expert in entity resolution and knowledge \
representation. Standardize entity names from a knowledge graph. Only group names that refer to \
the exact same real-world entity, keep every key detail (positions, numbers, qualifiers) in the \
standard name, and never over-standardize.";

const INFERENCE_SYSTEM: &str = "You are an expert in knowledge representation and inference. \
Infer plausible relationships between disconnected entities in a knowledge graph. Only infer \
relationships with clear support from the existing triples and the entities' inherent \
attributes; if none is plausible, return an empty array.";

const WITHIN_COMMUNITY_SYSTEM: &str = "You are an expert in knowledge representation and \
inference. Infer plausible relationships between semantically related entities that are not yet \
connected in a knowledge graph.";

const COMMUNITY_SUMMARY_SYSTEM: &str = "You are an expert at summarizing the semantics of \
knowledge graph communities.";

/// Entity resolution request listing the names to standardize.
pub fn entity_resolution_user(entities: &[String]) -> String {
    format!(
        r#"Below is a list of entity names extracted from a knowledge graph. Some refer to the same real-world entity with different wording.

1. Identify groups of names that definitely refer to the same concept.
2. Give each group a standardized name.
3. Only include entities that have variants or need standardization.

Entity list:
{}

Return a JSON object whose keys are standardized names and whose values are arrays of the variant names that map to them:
{{
  "standardized name 1": ["variant 1", "variant 2"],
  "standardized name 2": ["variant 3", "variant 4"]
}}"#,
        serde_json::to_string(entities).unwrap_or_default()
    )
}

/// Cross-component bridging request.
pub fn inference_user(entities1: &[String], entities2: &[String], triples_text: &str) -> String {
    format!(
        r#"A knowledge graph has two disconnected communities of entities.

Community 1 entities: {}
Community 2 entities: {}

Existing relationships involving these entities:
{}

Infer 2-3 plausible relationships between an entity from Community 1 and an entity from Community 2.
- Only infer relationships supported by the existing triples and the entities' attributes.
- Never force an artificial relationship; return fewer (or none) if that is all that is supported.
- Predicates must be at most three words.
- Subject and object must be different entities.

Return a JSON array:
[
  {{"subject": "entity from community 1", "predicate": "inferred relationship", "object": "entity from community 2"}}
]"#,
        entities1.join(", "),
        entities2.join(", "),
        triples_text
    )
}

/// Within-component bridging request for candidate pairs.
pub fn within_community_user(pairs_text: &str, triples_text: &str) -> String {
    format!(
        r#"A knowledge graph has entities that appear semantically related but are not directly connected.

Candidate pairs:
{}

Existing relationships involving these entities:
{}

Infer plausible relationships between these pairs. Exclude pairs with no plausible connection.
- Predicates must be at most three words.
- Subject and object must be different entities.

Return a JSON array:
[
  {{"subject": "entity1", "predicate": "inferred relationship", "object": "entity2"}}
]"#,
        pairs_text, triples_text
    )
}

/// Community summary request built from the community's structure.
pub fn community_summary_user(
    core_nodes: &[String],
    relations: &[String],
    sample_paths: &[String],
) -> String {
    let paths = if sample_paths.is_empty() {
        "none".to_string()
    } else {
        sample_paths.join("; ")
    };
    format!(
        r#"Summarize the domain of this knowledge graph community in one sentence of at most 100 characters.

Core entities (by degree): {}
Most frequent relations: {}
Sample paths: {}

Name the domain and the kind of entities and relations it covers. Output only the summary."#,
        core_nodes.join(", "),
        relations.join(", "),
        paths
    )
}
