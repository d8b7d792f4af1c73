use super::recall::RecallResult;

/// Prompt used when nothing relevant was recalled.
pub const NO_CONTEXT_PROMPT: &str =
    "No relevant knowledge graph information was found; answer the question directly.";

const CONTEXT_HEADER: &str = "Knowledge graph facts:\n";

const ANSWER_REQUIREMENTS: &str = "\nAnswer requirements:\n\
1. Base the answer on the facts above; do not invent relationships they do not state.\n\
2. If the facts do not cover the question, say so and answer from general knowledge.\n\
3. Keep the answer concise and refer to entities by the names used above.\n";

/// Render ranked paths as the context block handed to the answering model.
pub fn format_prompt(ranked: &[RecallResult]) -> String {
    if ranked.is_empty() {
        return NO_CONTEXT_PROMPT.to_string();
    }

    let mut out = String::from(CONTEXT_HEADER);
    for (i, path) in ranked.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, path.text()));
    }
    out.push_str(ANSWER_REQUIREMENTS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_uses_fixed_sentence() {
        assert_eq!(format_prompt(&[]), NO_CONTEXT_PROMPT);
    }

    #[test]
    fn facts_are_numbered_in_order() {
        let prompt = format_prompt(&[
            RecallResult::single("Paris", "capital of", "France"),
            RecallResult::single("Paris", "located on", "Seine"),
        ]);
        assert!(prompt.starts_with(
            "Knowledge graph facts:\n1. Paris capital of France\n2. Paris located on Seine\n"
        ));
        assert!(prompt.ends_with(ANSWER_REQUIREMENTS));
    }
}
