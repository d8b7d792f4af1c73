//! Triple extraction from QA pairs and text chunks.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::chunker::Chunk;
use super::parser;
use super::triple::{limit_predicate_length, triples_from_value, Triple};
use crate::integrations::{CallParams, CompletionModel};
use crate::prompts::{Prompt, PromptSet};
use crate::{Error, Result};

/// A question/answer record from a QA dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn to_text(&self) -> String {
        format!("Question: {}\nAnswer: {}", self.question, self.answer)
    }
}

/// Load a JSON array of `{question, answer}` objects; malformed items are skipped.
pub fn load_qa_file(path: &Path) -> Result<Vec<QaPair>> {
    let raw = std::fs::read_to_string(path)?;
    parse_qa_json(raw.trim_start_matches('\u{feff}'))
}

pub fn parse_qa_json(text: &str) -> Result<Vec<QaPair>> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(items) = value else {
        return Err(Error::InvalidArgument(
            "QA file must contain a JSON array".to_string(),
        ));
    };

    let mut pairs = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let question = item.get("question").and_then(Value::as_str);
        let answer = item.get("answer").and_then(Value::as_str);
        match (question, answer) {
            (Some(q), Some(a)) => pairs.push(QaPair {
                question: q.trim().to_string(),
                answer: a.trim().to_string(),
            }),
            _ => warn!("Extraction: skipping invalid QA item {}", i),
        }
    }
    Ok(pairs)
}

/// One piece of source text sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionUnit {
    pub source_ref: String,
    pub text: String,
}

impl ExtractionUnit {
    pub fn from_qa(pairs: &[QaPair]) -> Vec<Self> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, pair)| Self {
                source_ref: format!("qa:{}", i),
                text: pair.to_text(),
            })
            .collect()
    }

    pub fn from_chunks(chunks: &[Chunk]) -> Vec<Self> {
        chunks
            .iter()
            .map(|chunk| Self {
                source_ref: chunk.source_ref(),
                text: chunk.text.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub units: usize,
    pub failed_units: usize,
    pub invalid_items: usize,
    pub triples: usize,
}

pub struct TripleExtractor {
    model: Arc<dyn CompletionModel>,
    prompts: PromptSet,
    params: CallParams,
}

impl TripleExtractor {
    pub fn new(model: Arc<dyn CompletionModel>, prompts: PromptSet, params: CallParams) -> Self {
        Self {
            model,
            prompts,
            params,
        }
    }

    fn user_prompt(&self, text: &str) -> String {
        format!("{}```\n{}\n```\n", self.prompts.get(Prompt::ExtractionUser), text)
    }

    /// Extract from one unit. Returns the valid triples and the number of rejected items.
    pub async fn extract(&self, unit: &ExtractionUnit) -> Result<(Vec<Triple>, usize)> {
        let response = self
            .model
            .complete(
                self.prompts.get(Prompt::ExtractionSystem),
                &self.user_prompt(&unit.text),
                self.params.temperature,
                self.params.max_tokens,
            )
            .await?;

        let value = parser::parse(&response).ok_or_else(|| {
            Error::SerializationError(format!("no JSON in response for {}", unit.source_ref))
        })?;
        let (triples, invalid) = triples_from_value(&value);

        let triples = triples
            .into_iter()
            .map(|mut t| {
                t.predicate = limit_predicate_length(&t.predicate);
                t.source_ref = Some(unit.source_ref.clone());
                t
            })
            .collect();
        Ok((triples, invalid))
    }

    /// Extract from every unit in order; failing units are logged and skipped.
    pub async fn extract_all(&self, units: &[ExtractionUnit]) -> (Vec<Triple>, ExtractionReport) {
        let mut report = ExtractionReport {
            units: units.len(),
            ..Default::default()
        };
        let mut all = Vec::new();

        for (i, unit) in units.iter().enumerate() {
            debug!("Extraction: unit {}/{} ({})", i + 1, units.len(), unit.source_ref);
            match self.extract(unit).await {
                Ok((triples, invalid)) => {
                    report.invalid_items += invalid;
                    if invalid > 0 {
                        warn!(
                            "Extraction: {} invalid items dropped from {}",
                            invalid, unit.source_ref
                        );
                    }
                    if triples.is_empty() {
                        warn!("Extraction: no valid triples in {}", unit.source_ref);
                        report.failed_units += 1;
                    }
                    all.extend(triples);
                }
                Err(err) => {
                    warn!("Extraction: {} failed: {}", unit.source_ref, err);
                    report.failed_units += 1;
                }
            }
        }

        report.triples = all.len();
        info!(
            "Extraction: {} triples from {} units ({} failed)",
            report.triples, report.units, report.failed_units
        );
        (all, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphrag::chunker::Chunker;
    use crate::graphrag::testing::ScriptedModel;

    #[test]
    fn qa_items_missing_fields_are_skipped() {
        let pairs = parse_qa_json(
            r#"[
                {"question": " Who runs Line 3? ", "answer": "Metro Co."},
                {"question": "orphan"},
                {"answer": 5}
            ]"#,
        )
        .unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].question, "Who runs Line 3?");
        assert_eq!(
            pairs[0].to_text(),
            "Question: Who runs Line 3?\nAnswer: Metro Co."
        );
    }

    #[test]
    fn qa_file_must_be_an_array() {
        let err = parse_qa_json(r#"{"question": "q"}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn qa_file_with_bom_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.json");
        std::fs::write(&path, "\u{feff}[{\"question\":\"q\",\"answer\":\"a\"}]").unwrap();
        assert_eq!(load_qa_file(&path).unwrap().len(), 1);
    }

    #[test]
    fn units_carry_source_refs() {
        let qa = ExtractionUnit::from_qa(&[QaPair {
            question: "q".to_string(),
            answer: "a".to_string(),
        }]);
        assert_eq!(qa[0].source_ref, "qa:0");

        let chunks = Chunker::new(2, 0).chunk("a b c", "doc");
        let units = ExtractionUnit::from_chunks(&chunks);
        assert_eq!(units[1].source_ref, "chunk:1");
        assert_eq!(units[1].text, "c");
    }

    #[tokio::test]
    async fn extraction_validates_and_caps() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(r#"```json
[
  {"subject": "Line 3", "predicate": "was constructed by the", "object": "Metro Co"},
  {"subject": "Line 3", "object": "2019"},
  {"subject": "Line 3", "predicate": "length", "object": 26.5},
]
```"#
                .to_string()),
            Ok("I cannot help with that".to_string()),
            Err(Error::CompletionError("boom".to_string())),
        ]));
        let extractor = TripleExtractor::new(model.clone(), PromptSet::builtin(), CallParams::default());
        let units: Vec<ExtractionUnit> = (0..3)
            .map(|i| ExtractionUnit {
                source_ref: format!("qa:{}", i),
                text: format!("text {}", i),
            })
            .collect();

        let (triples, report) = extractor.extract_all(&units).await;
        assert_eq!(triples.len(), 2);
        assert_eq!(triples[0].predicate, "was constructed");
        assert_eq!(triples[1].object, "26.5");
        assert_eq!(triples[0].source_ref.as_deref(), Some("qa:0"));
        assert_eq!(
            report,
            ExtractionReport {
                units: 3,
                failed_units: 2,
                invalid_items: 1,
                triples: 2
            }
        );

        let calls = model.calls.lock().unwrap();
        assert!(calls[0].1.ends_with("```\ntext 0\n```\n"));
    }
}
