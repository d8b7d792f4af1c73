//! Structured-output recovery for model responses.
//!
//! Model output may be fenced, carry trailing commas or bare keys, or stop
//! mid-array when the generation hits its token limit. [`parse`] tries, in
//! order:
//! 1. the inner text of a fenced code block, when one exists
//! 2. a direct JSON parse
//! 3. the bracket-matched array starting at the first `[`
//! 4. the same substring after key-quoting and trailing-comma repairs
//! 5. for truncated arrays, only the complete `{...}` elements, reassembled
//!
//! It never fails loudly: `None` means the caller should log and skip the unit.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("valid fence regex"));
static BARE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\{,]\s*)(\w+)(\s*):").expect("valid key regex"));
static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[\]}])").expect("valid comma regex"));

/// Recover a JSON value from arbitrary model output.
pub fn parse(text: &str) -> Option<Value> {
    let text = match FENCE_RE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    };

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    let start = text.find('[')?;
    match matching_bracket(text, start) {
        Some(end) => {
            let candidate = &text[start..=end];
            serde_json::from_str(candidate)
                .ok()
                .or_else(|| parse_repaired(candidate))
        }
        None => {
            debug!("Parser: unterminated array, salvaging complete objects");
            let objects = complete_objects(text, start + 1);
            if objects.is_empty() {
                return None;
            }
            let rebuilt = format!("[\n{}\n]", objects.join(",\n"));
            serde_json::from_str(&rebuilt)
                .ok()
                .or_else(|| parse_repaired(&rebuilt))
        }
    }
}

/// Quote bare object keys and drop trailing commas, then parse.
fn parse_repaired(text: &str) -> Option<Value> {
    let fixed = BARE_KEY_RE.replace_all(text, "${1}\"${2}\"${3}:");
    let fixed = TRAILING_COMMA_RE.replace_all(&fixed, "${1}");
    serde_json::from_str(&fixed).ok()
}

/// Byte index of the `]` closing the `[` at `start`.
fn matching_bracket(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in text.bytes().enumerate().skip(start) {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Complete top-level `{...}` elements of a truncated array body.
///
/// An element only counts once the array continues past it (a `,` or `]`
/// follows); the trailing element may have been cut inside a nested value.
fn complete_objects(text: &str, from: usize) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut obj_start = None;

    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                if depth == 0 {
                    obj_start = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(start) = obj_start.take() {
                        if followed_by_separator(bytes, i + 1) {
                            objects.push(&text[start..=i]);
                        }
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    objects
}

fn followed_by_separator(bytes: &[u8], from: usize) -> bool {
    bytes[from.min(bytes.len())..]
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b',' || *b == b']')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_json() {
        assert_eq!(parse(r#"[{"a":1}]"#), Some(json!([{"a": 1}])));
    }

    #[test]
    fn fenced_block_matches_direct_parse() {
        let fenced = parse("```json\n[{\"a\":1}]\n```");
        assert_eq!(fenced, parse(r#"[{"a":1}]"#));
        assert!(fenced.is_some());
    }

    #[test]
    fn fence_without_language_tag() {
        let text = "Here you go:\n```\n[{\"subject\":\"x\"}]\n```\nDone.";
        assert_eq!(parse(text), Some(json!([{"subject": "x"}])));
    }

    #[test]
    fn extracts_array_surrounded_by_prose() {
        let text = "Sure! The triples are [{\"a\":1},{\"b\":[2,3]}] as requested.";
        assert_eq!(parse(text), Some(json!([{"a": 1}, {"b": [2, 3]}])));
    }

    #[test]
    fn repairs_bare_keys_and_trailing_commas() {
        let text = "result: [{subject: \"a\", predicate: \"p\", object: \"b\",},]";
        assert_eq!(
            parse(text),
            Some(json!([{"subject": "a", "predicate": "p", "object": "b"}]))
        );
    }

    #[test]
    fn truncated_array_keeps_only_leading_complete_objects() {
        assert_eq!(parse(r#"[{"a":1},{"b":2}"#), Some(json!([{"a": 1}])));
        assert_eq!(parse(r#"[{"a":1},{"b":2"#), Some(json!([{"a": 1}])));
    }

    #[test]
    fn truncated_array_with_nested_objects() {
        let text = r#"[{"a":{"x":1}}, {"b":2}, {"c":{"y":"#;
        assert_eq!(parse(text), Some(json!([{"a": {"x": 1}}, {"b": 2}])));
    }

    #[test]
    fn truncated_array_with_bare_keys_is_repaired() {
        let text = "[{a: 1}, {b: 2}, {c:";
        assert_eq!(parse(text), Some(json!([{"a": 1}, {"b": 2}])));
    }

    #[test]
    fn object_response_parses_directly() {
        let text = "```json\n{\"Paris\": [\"paris city\"]}\n```";
        assert_eq!(parse(text), Some(json!({"Paris": ["paris city"]})));
    }

    #[test]
    fn garbage_returns_none() {
        assert_eq!(parse("I could not find any relationships."), None);
        assert_eq!(parse("[ not json at all ]"), None);
        assert_eq!(parse("[{\"a\":"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn handles_multibyte_text() {
        let text = "结果如下：[{\"subject\":\"南宁地铁\",\"predicate\":\"埋深\",\"object\":\"18米\"}]";
        assert_eq!(
            parse(text),
            Some(json!([{"subject": "南宁地铁", "predicate": "埋深", "object": "18米"}]))
        );
    }
}
