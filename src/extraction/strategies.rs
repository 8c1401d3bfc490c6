// Ordered parse strategies for recovering JSON from free text

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

static FENCED_BLOCK_REGEX: OnceLock<Regex> = OnceLock::new();

fn fenced_block_regex() -> &'static Regex {
    FENCED_BLOCK_REGEX.get_or_init(|| {
        Regex::new(r"```(?:json|JSON)?[ \t]*\r?\n([\s\S]*?)```").expect("Invalid regex")
    })
}

/// A single way of turning text into a structured value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    /// The whole text is JSON
    Direct,
    /// A ```json fenced block
    FencedBlock,
    /// The first array substring that contains at least one object
    ArraySubstring,
    /// The first object substring
    ObjectSubstring,
}

impl ParseStrategy {
    /// Strategies in the order they are attempted
    pub fn ordered() -> &'static [ParseStrategy] {
        &[
            ParseStrategy::Direct,
            ParseStrategy::FencedBlock,
            ParseStrategy::ArraySubstring,
            ParseStrategy::ObjectSubstring,
        ]
    }

    /// Try this strategy alone. `None` means "not found", never an error.
    pub fn attempt(&self, text: &str) -> Option<Value> {
        match self {
            ParseStrategy::Direct => parse_whole(text),
            ParseStrategy::FencedBlock => fenced_block_regex()
                .captures_iter(text)
                .filter_map(|cap| cap.get(1))
                .find_map(|m| parse_whole(m.as_str())),
            ParseStrategy::ArraySubstring => first_value_at(text, '[', |v| {
                v.as_array()
                    .map_or(false, |items| items.iter().any(Value::is_object))
            }),
            ParseStrategy::ObjectSubstring => first_value_at(text, '{', Value::is_object),
        }
    }
}

/// Run the strategies in order and return the first success
pub fn parse_structured(text: &str) -> Option<(Value, ParseStrategy)> {
    ParseStrategy::ordered()
        .iter()
        .find_map(|strategy| strategy.attempt(text).map(|v| (v, *strategy)))
}

fn parse_whole(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text.trim())
        .ok()
        .filter(|v| v.is_array() || v.is_object())
}

/// Parse a JSON value starting at each `open` character in turn; the parser
/// stops at the end of the value, so trailing commentary is ignored.
fn first_value_at(text: &str, open: char, accept: impl Fn(&Value) -> bool) -> Option<Value> {
    text.char_indices()
        .filter(|(_, c)| *c == open)
        .find_map(|(i, _)| {
            let mut stream = serde_json::Deserializer::from_str(&text[i..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) if accept(&value) => Some(value),
                _ => None,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct() {
        let (value, strategy) = parse_structured(r#"  [{"a": 1}]  "#).unwrap();
        assert_eq!(strategy, ParseStrategy::Direct);
        assert_eq!(value, json!([{"a": 1}]));
    }

    #[test]
    fn test_direct_rejects_scalars() {
        assert!(ParseStrategy::Direct.attempt("42").is_none());
        assert!(ParseStrategy::Direct.attempt("\"text\"").is_none());
    }

    #[test]
    fn test_fenced_block() {
        let text = "Sure! Here you go:\n```json\n{\"questions\": [], \"complete\": true}\n```\nAnything else?";
        let (value, strategy) = parse_structured(text).unwrap();
        assert_eq!(strategy, ParseStrategy::FencedBlock);
        assert_eq!(value["complete"], json!(true));
    }

    #[test]
    fn test_array_substring_requires_an_object() {
        let text = r#"Scores [1, 2, 3] then the list: [{"title": "Grid storage"}] done."#;
        let value = ParseStrategy::ArraySubstring.attempt(text).unwrap();
        assert_eq!(value, json!([{"title": "Grid storage"}]));

        assert!(ParseStrategy::ArraySubstring.attempt("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_array_preferred_over_object() {
        let text = r#"Note {"x": 1} and [{"y": 2}]"#;
        let (value, strategy) = parse_structured(text).unwrap();
        assert_eq!(strategy, ParseStrategy::ArraySubstring);
        assert_eq!(value, json!([{"y": 2}]));
    }

    #[test]
    fn test_object_substring() {
        let text = r#"Result: {"questions": ["Do you build chips?"], "complete": false} -- end"#;
        let (value, strategy) = parse_structured(text).unwrap();
        assert_eq!(strategy, ParseStrategy::ObjectSubstring);
        assert_eq!(value["questions"][0], json!("Do you build chips?"));
    }

    #[test]
    fn test_skips_malformed_candidates() {
        let text = r#"{broken and then {"ok": true}"#;
        let value = ParseStrategy::ObjectSubstring.attempt(text).unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[test]
    fn test_garbage_finds_nothing() {
        assert!(parse_structured("no structure here [ nor { here").is_none());
        assert!(parse_structured("").is_none());
    }

    #[test]
    fn test_multibyte_text_around_json() {
        let text = "Voilà — les résultats: [{\"nom\": \"Électrique\"}] ✓";
        let (value, _) = parse_structured(text).unwrap();
        assert_eq!(value[0]["nom"], json!("Électrique"));
    }
}
