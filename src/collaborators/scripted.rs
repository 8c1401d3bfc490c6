// Deterministic in-process collaborators for tests and offline runs

use super::{SearchProvider, TextGenerator};
use crate::error::{GenerationError, SearchError};
use crate::models::Snippet;
use crate::utils::{lock_mutex_recover, truncate_for_log};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Text generator replaying canned replies.
///
/// Queued replies are consumed first, in order. Once the queue is empty the
/// first rule whose key occurs in the prompt answers, then the fallback reply.
/// With nothing left the call fails with `GenerationError::Exhausted`.
#[derive(Default)]
pub struct ScriptedGenerator {
    queue: Mutex<VecDeque<Result<String, GenerationError>>>,
    rules: Vec<(String, String)>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            queue: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Answer prompts containing `key` with `reply`
    pub fn with_rule(mut self, key: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((key.into(), reply.into()));
        self
    }

    /// Reply used when no queued reply or rule applies
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Queue another reply
    pub fn push(&self, reply: Result<String, GenerationError>) {
        lock_mutex_recover(&self.queue).push_back(reply);
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        lock_mutex_recover(&self.prompts).clone()
    }

    pub fn call_count(&self) -> usize {
        lock_mutex_recover(&self.prompts).len()
    }

    /// Rule-based generator producing plausible replies for every built-in prompt
    pub fn offline() -> Self {
        Self::default()
            .with_rule(
                "conservative researcher",
                r#"[{"url": "", "snippet": "The company may operate several product lines and possibly runs its own engineering team."}]"#,
            )
            .with_rule(
                "human clarifications",
                r#"[{"category": "Product & Technology", "competency": "Core Engineering", "description": "In-house engineering confirmed by the company", "technology_level": "Advanced", "source_url": ""}]"#,
            )
            .with_rule(
                "website snippets",
                r#"[{"category": "Product & Technology", "competency": "Core Products", "description": "Main product portfolio", "technology_level": "Product", "source_url": ""}]"#,
            )
            .with_rule(
                "identify missing information",
                r#"{"questions": ["Do you have in-house manufacturing capabilities (e.g., large-scale factories)?"], "complete": false}"#,
            )
            .with_rule(
                "creative strategist",
                r#"[{"title": "Modular Service Platform", "components": ["software", "services"], "application_area": "Enterprise", "strategic_rationale": "Builds on the existing product base", "example_analogs": []},
                    {"title": "Partner Ecosystem", "components": ["APIs"], "application_area": "Platform", "strategic_rationale": "Extends reach through partners", "example_analogs": ["App stores"]}]"#,
            )
            .with_rule("real-world analogous", r#"["Subscription software", "Equipment leasing", "Marketplaces"]"#)
            .with_rule(
                "senior corporate strategist",
                "### Executive Summary\nOffline placeholder plan.\n\n### Risk Assessment\nNot assessed offline.",
            )
            .with_fallback("[]")
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        lock_mutex_recover(&self.prompts).push(prompt.to_string());

        if let Some(reply) = lock_mutex_recover(&self.queue).pop_front() {
            return reply;
        }

        if let Some((_, reply)) = self.rules.iter().find(|(key, _)| prompt.contains(key.as_str())) {
            return Ok(reply.clone());
        }

        self.fallback
            .clone()
            .ok_or_else(|| GenerationError::Exhausted(truncate_for_log(prompt, 80)))
    }
}

/// Canned outcome of a [`StaticSearch`]
#[derive(Debug, Clone)]
pub enum StaticOutcome {
    Snippets(Vec<Snippet>),
    NotConfigured,
    Status(u16),
}

/// Search provider returning a fixed outcome
pub struct StaticSearch {
    outcome: StaticOutcome,
    calls: AtomicUsize,
}

impl StaticSearch {
    pub fn new(snippets: Vec<Snippet>) -> Self {
        Self::with_outcome(StaticOutcome::Snippets(snippets))
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_outcome(outcome: StaticOutcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<Snippet>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            StaticOutcome::Snippets(snippets) => {
                Ok(snippets.iter().take(max_results).cloned().collect())
            }
            StaticOutcome::NotConfigured => {
                Err(SearchError::NotConfigured("no search provider configured".to_string()))
            }
            StaticOutcome::Status(status) => Err(SearchError::Http {
                status: *status,
                body: String::new(),
            }),
        }
    }
}
