// generate_ideas: innovation ideas from the validated competencies

use super::{Replay, StageContext, StageHandler};
use crate::error::WorkflowError;
use crate::extraction::idea_from_value;
use crate::models::{Competency, Idea};
use crate::prompts::builtin;
use crate::records::{replace_session_records, Collection};
use crate::workflow::{SessionState, StageName, StatePatch};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct GenerateIdeasStage;

impl GenerateIdeasStage {
    /// Replace the session's entries; re-extraction mints new competency ids
    async fn index_competencies(&self, state: &SessionState, ctx: &StageContext, competencies: &[Competency]) {
        if let Err(e) = ctx.index.remove_session(&state.session_id).await {
            log::warn!("[{}] Failed to clear stale index entries: {}", state.session_id, e);
        }
        for c in competencies {
            let metadata = json!({
                "session_id": state.session_id,
                "competency": c.competency,
                "category": c.category,
            });
            if let Err(e) = ctx.index.index(&c.id, &c.index_text(), metadata).await {
                log::warn!("[{}] Failed to index competency {}: {}", state.session_id, c.id, e);
            }
        }
    }

    async fn related_competencies(
        &self,
        state: &SessionState,
        ctx: &StageContext,
        competencies: &[Competency],
        idea: &Idea,
    ) -> Vec<String> {
        if ctx.settings.related_competencies == 0 {
            return Vec::new();
        }
        let text = format!("{} {}", idea.title, idea.strategic_rationale);
        match ctx
            .index
            .query_session(&text, ctx.settings.related_competencies, &state.session_id)
            .await
        {
            Ok(hits) => hits
                .into_iter()
                .map(|n| n.id)
                .filter(|id| competencies.iter().any(|c| &c.id == id))
                .collect(),
            Err(e) => {
                log::warn!("[{}] Similarity query failed: {}", state.session_id, e);
                Vec::new()
            }
        }
    }

    /// Fill missing analogs; failures leave the idea as it was
    async fn find_analogs(&self, ctx: &StageContext, idea: &Idea) -> Vec<String> {
        let mut context = tera::Context::new();
        context.insert("title", &idea.title);
        context.insert("rationale", &idea.strategic_rationale);
        let prompt = match ctx.render(builtin::ANALOG_FINDER, &context) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Analog prompt unavailable: {}", e);
                return Vec::new();
            }
        };

        match ctx.extractor.extract_structured(&prompt).await {
            Ok(extraction) => extraction
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            Err(e) => {
                log::debug!("Analog lookup for '{}' failed: {}", idea.title, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl StageHandler for GenerateIdeasStage {
    fn name(&self) -> StageName {
        StageName::GenerateIdeas
    }

    fn replay(&self) -> Replay {
        Replay::LastWriteWins
    }

    fn is_satisfied(&self, state: &SessionState) -> bool {
        state.ideas.is_some()
    }

    async fn execute(
        &self,
        state: &SessionState,
        ctx: &StageContext,
    ) -> Result<StatePatch, WorkflowError> {
        let competencies = state
            .competencies
            .as_ref()
            .ok_or_else(|| WorkflowError::precondition(self.name(), "competencies"))?;
        if !state.clarification_gate_open() {
            return Err(WorkflowError::precondition(
                self.name(),
                "resolved clarification loop",
            ));
        }

        self.index_competencies(state, ctx, competencies).await;

        let mut context = tera::Context::new();
        context.insert("max_ideas", &ctx.settings.max_ideas);
        context.insert("company", &state.company_name);
        context.insert("competencies", competencies);
        let prompt = ctx.render(builtin::IDEA_GENERATION, &context)?;

        let extraction = ctx.extractor.extract_structured(&prompt).await?;
        let mut ideas: Vec<Idea> = extraction
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| idea_from_value(&state.session_id, item))
                    .take(ctx.settings.max_ideas)
                    .collect()
            })
            .unwrap_or_default();

        if ideas.is_empty() {
            log::warn!("[{}] No ideas recoverable from the generator", state.session_id);
        }

        for idea in ideas.iter_mut() {
            idea.related_competencies = self.related_competencies(state, ctx, competencies, idea).await;
            if ctx.settings.enrich_analogs && idea.example_analogs.is_empty() {
                idea.example_analogs = self.find_analogs(ctx, idea).await;
            }
        }

        replace_session_records(ctx.records.as_ref(), Collection::Ideas, &state.session_id, &ideas)?;
        log::info!("[{}] Generated {} ideas", state.session_id, ideas.len());

        Ok(StatePatch::new().with_ideas(ideas))
    }
}
