//! Structured extraction from an unreliable text generator
//!
//! `extract_structured` calls the generator once, runs the ordered
//! [`ParseStrategy`] cascade on the reply and, if nothing is found, issues a
//! single repair round asking the generator to return only the JSON. An
//! unrecoverable reply is a normal outcome (`value: None`), not an error.

pub mod normalize;
pub mod strategies;

use crate::collaborators::TextGenerator;
use crate::error::WorkflowError;
use crate::prompts::{builtin, PromptLibrary};
use crate::utils::truncate_for_log;
use serde_json::Value;
use std::sync::Arc;

pub use normalize::{
    competencies_from_values, competency_from_row, competency_from_value, idea_from_value,
    normalize_level, string_field, string_list,
};
pub use strategies::{parse_structured, ParseStrategy};

const LOG_PREVIEW_CHARS: usize = 1200;

/// Outcome of one extraction
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Recovered object or array, `None` when nothing could be recovered
    pub value: Option<Value>,
    /// Reply the value came from (the repair reply if the repair round succeeded)
    pub raw_text: String,
    /// Strategy that produced the value
    pub strategy: Option<ParseStrategy>,
    /// Whether the repair round was needed
    pub repaired: bool,
}

impl Extraction {
    pub fn is_recovered(&self) -> bool {
        self.value.is_some()
    }

    /// The value, if it is an array
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        self.value.as_ref().and_then(Value::as_array)
    }

    /// The value, if it is an object
    pub fn as_object(&self) -> Option<&serde_json::Map<String, Value>> {
        self.value.as_ref().and_then(Value::as_object)
    }
}

/// Cascading parse/repair over a text generator
#[derive(Clone)]
pub struct StructuredExtractor {
    generator: Arc<dyn TextGenerator>,
    prompts: Arc<PromptLibrary>,
    repair: bool,
}

impl StructuredExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>, prompts: Arc<PromptLibrary>) -> Self {
        Self {
            generator,
            prompts,
            repair: true,
        }
    }

    /// Enable or disable the repair round
    pub fn with_repair(mut self, enabled: bool) -> Self {
        self.repair = enabled;
        self
    }

    pub fn generator(&self) -> &Arc<dyn TextGenerator> {
        &self.generator
    }

    /// Obtain a structured value for `prompt`.
    ///
    /// A failing primary call is returned as an error. Everything after it
    /// (including a failing repair call) degrades to `value: None`.
    pub async fn extract_structured(&self, prompt: &str) -> Result<Extraction, WorkflowError> {
        let raw = self.generator.generate(prompt).await?;
        log::debug!(
            "Generator reply (first call): {}",
            truncate_for_log(&raw, LOG_PREVIEW_CHARS)
        );

        if let Some((value, strategy)) = parse_structured(&raw) {
            log::debug!("Structured value recovered with {:?}", strategy);
            return Ok(Extraction {
                value: Some(value),
                raw_text: raw,
                strategy: Some(strategy),
                repaired: false,
            });
        }

        if self.repair {
            if let Some(extraction) = self.repair_round(&raw).await {
                return Ok(extraction);
            }
        }

        log::warn!("No structured data recoverable from generator reply");
        Ok(Extraction {
            value: None,
            raw_text: raw,
            strategy: None,
            repaired: false,
        })
    }

    async fn repair_round(&self, raw: &str) -> Option<Extraction> {
        let mut context = tera::Context::new();
        context.insert("raw", raw);
        let prompt = match self.prompts.render(builtin::JSON_REPAIR, &context) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Repair prompt unavailable: {}", e);
                return None;
            }
        };

        let repaired = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Repair call failed: {}", e);
                return None;
            }
        };
        log::debug!(
            "Generator reply (repair call): {}",
            truncate_for_log(&repaired, LOG_PREVIEW_CHARS)
        );

        parse_structured(&repaired).map(|(value, strategy)| Extraction {
            value: Some(value),
            raw_text: repaired,
            strategy: Some(strategy),
            repaired: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ScriptedGenerator;
    use crate::error::GenerationError;
    use serde_json::json;

    fn extractor(generator: Arc<ScriptedGenerator>) -> StructuredExtractor {
        StructuredExtractor::new(generator, Arc::new(PromptLibrary::builtin().unwrap()))
    }

    #[tokio::test]
    async fn test_well_formed_array_round_trips() {
        let text = r#"[{"competency": "Batteries", "technology_level": "Advanced"}]"#;
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(text.to_string())]));
        let extraction = extractor(generator.clone())
            .extract_structured("prompt")
            .await
            .unwrap();

        assert_eq!(
            extraction.value,
            Some(serde_json::from_str::<Value>(text).unwrap())
        );
        assert_eq!(extraction.strategy, Some(ParseStrategy::Direct));
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_commentary_recovered_without_repair() {
        let text = "Here are the competencies I found:\n[{\"competency\": \"Batteries\"}]\nLet me know!";
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(text.to_string())]));
        let extraction = extractor(generator.clone())
            .extract_structured("prompt")
            .await
            .unwrap();

        assert_eq!(extraction.value, Some(json!([{"competency": "Batteries"}])));
        assert!(!extraction.repaired);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_repair_round_recovers() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("I think the answer is: questions -> none".to_string()),
            Ok(r#"{"questions": [], "complete": true}"#.to_string()),
        ]));
        let extraction = extractor(generator.clone())
            .extract_structured("prompt")
            .await
            .unwrap();

        assert!(extraction.repaired);
        assert_eq!(extraction.as_object().unwrap()["complete"], json!(true));
        assert_eq!(generator.call_count(), 2);
        assert!(generator.prompts()[1].contains("I think the answer is"));
    }

    #[tokio::test]
    async fn test_garbage_returns_none_with_raw_text() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("utter garbage".to_string()),
            Ok("still garbage".to_string()),
        ]));
        let extraction = extractor(generator.clone())
            .extract_structured("prompt")
            .await
            .unwrap();

        assert_eq!(extraction.value, None);
        assert_eq!(extraction.raw_text, "utter garbage");
        // Repair runs at most once
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_repair_call_degrades() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("garbage".to_string()),
            Err(GenerationError::Transport("connection reset".into())),
        ]));
        let extraction = extractor(generator).extract_structured("prompt").await.unwrap();
        assert!(!extraction.is_recovered());
    }

    #[tokio::test]
    async fn test_failed_primary_call_propagates() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Err(GenerationError::Http {
            status: 503,
            body: "unavailable".into(),
        })]));
        let err = extractor(generator)
            .extract_structured("prompt")
            .await
            .unwrap_err();
        assert!(err.is_collaborator());
    }

    #[tokio::test]
    async fn test_repair_can_be_disabled() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("garbage".to_string())]));
        let extraction = extractor(generator.clone())
            .with_repair(false)
            .extract_structured("prompt")
            .await
            .unwrap();
        assert!(!extraction.is_recovered());
        assert_eq!(generator.call_count(), 1);
    }
}
