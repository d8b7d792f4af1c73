//! Triple record, ingestion-boundary validation and the shared text helpers
//! (predicate cap, grouping-key normalization) used across the build stages.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of whitespace tokens a predicate may keep.
pub const MAX_PREDICATE_WORDS: usize = 3;

/// Words dropped from the end of a truncated predicate.
const PREDICATE_STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "with", "by", "to", "from", "in", "on", "for",
];

/// Words ignored when building an entity grouping key.
const KEY_STOPWORDS: &[&str] = &[
    "the", "a", "an", "of", "and", "or", "in", "on", "at", "to", "for", "with", "by", "as",
];

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("valid word regex"));

/// A subject-predicate-object fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// Synthesized by inference rather than extracted from text.
    #[serde(default, skip_serializing_if = "is_false")]
    pub inferred: bool,
    /// Where an extracted triple came from (`qa:3`, `chunk:12`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            inferred: false,
            source_ref: None,
        }
    }

    pub fn inferred(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            inferred: true,
            ..Self::new(subject, predicate, object)
        }
    }

    pub fn with_source(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = Some(source_ref.into());
        self
    }

    /// Validate a loosely-typed JSON object into a triple.
    ///
    /// All three fields must be present and scalar; numbers and booleans are
    /// stringified. Blank values are rejected.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let subject = scalar_text(obj.get("subject")?)?;
        let predicate = scalar_text(obj.get("predicate")?)?;
        let object = scalar_text(obj.get("object")?)?;

        let inferred = obj
            .get("inferred")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let source_ref = obj
            .get("source_ref")
            .or_else(|| obj.get("chunk"))
            .and_then(scalar_text);

        Some(Self {
            subject,
            predicate,
            object,
            inferred,
            source_ref,
        })
    }

    /// Key used for deduplication.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.subject, &self.predicate, &self.object)
    }

    pub fn is_self_reference(&self) -> bool {
        self.subject == self.object
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Validate every element of a parsed model response.
///
/// Returns the valid triples and the number of rejected elements. A non-array
/// value yields no triples and counts as a single rejection.
pub fn triples_from_value(value: &Value) -> (Vec<Triple>, usize) {
    let Some(items) = value.as_array() else {
        return (Vec::new(), 1);
    };

    let mut triples = Vec::with_capacity(items.len());
    let mut invalid = 0;
    for item in items {
        match Triple::from_value(item) {
            Some(triple) => triples.push(triple),
            None => invalid += 1,
        }
    }
    (triples, invalid)
}

/// Cap a predicate at [`MAX_PREDICATE_WORDS`] whitespace tokens.
///
/// When truncation happens and the last kept word is a stopword, it is dropped
/// too (`"is located in the"` -> `"is located"`).
pub fn limit_predicate_length(predicate: &str) -> String {
    let words: Vec<&str> = predicate.split_whitespace().collect();
    if words.len() <= MAX_PREDICATE_WORDS {
        return predicate.to_string();
    }

    let mut kept = words[..MAX_PREDICATE_WORDS].to_vec();
    if let Some(last) = kept.last() {
        if PREDICATE_STOPWORDS.contains(&last.to_lowercase().as_str()) {
            kept.pop();
        }
    }
    kept.join(" ")
}

/// Grouping key of an entity name: lowercase word tokens without stopwords.
pub fn grouping_key(entity: &str) -> String {
    let lower = entity.to_lowercase();
    WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| !KEY_STOPWORDS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase whitespace tokens of an entity name.
pub fn lower_tokens(entity: &str) -> BTreeSet<String> {
    entity
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Unique subject/object names, in first-seen order.
pub fn unique_entities(triples: &[Triple]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for t in triples {
        for name in [&t.subject, &t.object] {
            if seen.insert(name.as_str()) {
                out.push(name.clone());
            }
        }
    }
    out
}

/// Predicates ranked by frequency (ties in first-seen order).
pub fn top_predicates(triples: &[Triple], limit: usize) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for t in triples {
        match counts.iter_mut().find(|(p, _)| *p == t.predicate) {
            Some((_, c)) => *c += 1,
            None => counts.push((t.predicate.clone(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(limit);
    counts
}
