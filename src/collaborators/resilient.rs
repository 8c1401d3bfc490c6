// Search with degraded fallbacks: provider, then synthesized snippets, then a minimal placeholder

use super::SearchProvider;
use crate::error::SearchError;
use crate::extraction::{string_field, StructuredExtractor};
use crate::models::Snippet;
use crate::prompts::{builtin, PromptLibrary};
use async_trait::async_trait;
use std::sync::Arc;

/// Number of hedge-worded snippets requested from the generator
const SYNTHESIZED_SNIPPETS: usize = 4;

/// Placeholder used when neither the provider nor the generator produced anything
pub fn minimal_snippet(company: &str) -> Snippet {
    Snippet::new(
        "",
        format!(
            "{} - no web API available; please confirm core competencies.",
            company
        ),
    )
}

/// Search provider that never returns an empty list
pub struct ResilientSearch {
    primary: Option<Arc<dyn SearchProvider>>,
    extractor: Option<StructuredExtractor>,
    prompts: Arc<PromptLibrary>,
}

impl ResilientSearch {
    pub fn new(
        primary: Option<Arc<dyn SearchProvider>>,
        extractor: Option<StructuredExtractor>,
        prompts: Arc<PromptLibrary>,
    ) -> Self {
        Self {
            primary,
            extractor,
            prompts,
        }
    }

    async fn from_primary(&self, query: &str, max_results: usize) -> Option<Vec<Snippet>> {
        let primary = self.primary.as_ref()?;
        match primary.search(query, max_results).await {
            Ok(snippets) if !snippets.is_empty() => Some(snippets),
            Ok(_) => {
                log::warn!("Search provider returned no snippets for '{}'", query);
                None
            }
            Err(e) => {
                log::warn!("Search provider failed for '{}': {}", query, e);
                None
            }
        }
    }

    async fn synthesized(&self, company: &str, max_results: usize) -> Option<Vec<Snippet>> {
        let extractor = self.extractor.as_ref()?;

        let mut context = tera::Context::new();
        context.insert("company", company);
        context.insert("count", &SYNTHESIZED_SNIPPETS);
        let prompt = match self.prompts.render(builtin::SEARCH_FALLBACK, &context) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Search fallback prompt unavailable: {}", e);
                return None;
            }
        };

        let extraction = match extractor.extract_structured(&prompt).await {
            Ok(extraction) => extraction,
            Err(e) => {
                log::warn!("Generator fallback failed to produce snippets: {}", e);
                return None;
            }
        };

        let snippets: Vec<Snippet> = extraction
            .as_array()?
            .iter()
            .filter_map(|item| {
                let text = string_field(item, &["snippet", "text", "content"])?;
                let url = string_field(item, &["url"]).unwrap_or_default();
                Some(Snippet::new(url, text))
            })
            .take(max_results)
            .collect();

        if snippets.is_empty() {
            None
        } else {
            log::info!(
                "Generator fallback produced {} snippets for '{}'",
                snippets.len(),
                company
            );
            Some(snippets)
        }
    }
}

#[async_trait]
impl SearchProvider for ResilientSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Snippet>, SearchError> {
        if let Some(snippets) = self.from_primary(query, max_results).await {
            return Ok(snippets);
        }
        if let Some(snippets) = self.synthesized(query, max_results).await {
            return Ok(snippets);
        }
        log::warn!("No snippets available for '{}', using placeholder", query);
        Ok(vec![minimal_snippet(query)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::scripted::StaticOutcome;
    use crate::collaborators::{ScriptedGenerator, StaticSearch};

    fn prompts() -> Arc<PromptLibrary> {
        Arc::new(PromptLibrary::builtin().unwrap())
    }

    fn extractor(generator: Arc<ScriptedGenerator>) -> StructuredExtractor {
        StructuredExtractor::new(generator, prompts())
    }

    #[tokio::test]
    async fn test_primary_results_are_used() {
        let primary = Arc::new(StaticSearch::new(vec![Snippet::new("u", "Acme builds cars")]));
        let generator = Arc::new(ScriptedGenerator::new(vec![]));
        let search = ResilientSearch::new(Some(primary), Some(extractor(generator.clone())), prompts());

        let snippets = search.search("Acme", 5).await.unwrap();
        assert_eq!(snippets[0].text, "Acme builds cars");
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_primary_falls_back_to_generator() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(
            r#"[{"url": "", "snippet": "Acme may build electric vehicles."}]"#.to_string(),
        )]));
        let search = ResilientSearch::new(
            Some(Arc::new(StaticSearch::empty())),
            Some(extractor(generator.clone())),
            prompts(),
        );

        let snippets = search.search("Acme", 5).await.unwrap();
        assert_eq!(snippets.len(), 1);
        assert!(snippets[0].text.contains("may"));
        assert!(generator.prompts()[0].contains("'Acme'"));
    }

    #[tokio::test]
    async fn test_unconfigured_primary_degrades() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(
            r#"[{"url": "", "snippet": "Acme possibly makes robots."}]"#.to_string(),
        )]));
        let search = ResilientSearch::new(
            Some(Arc::new(StaticSearch::with_outcome(StaticOutcome::NotConfigured))),
            Some(extractor(generator)),
            prompts(),
        );
        let snippets = search.search("Acme", 5).await.unwrap();
        assert!(snippets[0].text.contains("possibly"));
    }

    #[tokio::test]
    async fn test_everything_failing_yields_placeholder() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("no json".to_string()),
            Ok("still no json".to_string()),
        ]));
        let search = ResilientSearch::new(
            Some(Arc::new(StaticSearch::with_outcome(StaticOutcome::Status(500)))),
            Some(extractor(generator)),
            prompts(),
        );

        let snippets = search.search("Acme", 5).await.unwrap();
        assert_eq!(snippets, vec![minimal_snippet("Acme")]);
    }

    #[tokio::test]
    async fn test_no_collaborators_yields_placeholder() {
        let search = ResilientSearch::new(None, None, prompts());
        let snippets = search.search("Acme", 5).await.unwrap();
        assert_eq!(
            snippets[0].text,
            "Acme - no web API available; please confirm core competencies."
        );
    }
}
