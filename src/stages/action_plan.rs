// generate_action_plans: one markdown plan per selected idea

use super::{Replay, StageContext, StageHandler};
use crate::error::WorkflowError;
use crate::prompts::builtin;
use crate::ranking::RankedIdea;
use crate::utils::{action_plan_path, atomic_write};
use crate::workflow::{SessionState, StageName, StatePatch};
use async_trait::async_trait;

/// Section body written when the generator fails for an idea
pub const PLAN_FAILED_PLACEHOLDER: &str = "_Action plan generation failed due to API error._";

pub struct ActionPlanStage;

impl ActionPlanStage {
    async fn plan_for(&self, state: &SessionState, ctx: &StageContext, ranked: &RankedIdea) -> Result<String, WorkflowError> {
        let idea = &ranked.idea;
        let related: Vec<String> = state
            .competencies
            .as_ref()
            .map(|all| {
                all.iter()
                    .filter(|c| idea.related_competencies.contains(&c.id))
                    .map(|c| c.competency.clone())
                    .collect()
            })
            .unwrap_or_default();

        let mut context = tera::Context::new();
        context.insert("company", &state.company_name);
        context.insert("title", &idea.title);
        context.insert("components", &idea.components);
        context.insert("rationale", &idea.strategic_rationale);
        context.insert("related", &related);
        let prompt = ctx.render(builtin::ACTION_PLAN, &context)?;

        match ctx.extractor.generator().generate(&prompt).await {
            Ok(plan) => Ok(plan.trim().to_string()),
            Err(e) => {
                log::warn!(
                    "[{}] Action plan for '{}' failed: {}",
                    state.session_id,
                    idea.title,
                    e
                );
                Ok(PLAN_FAILED_PLACEHOLDER.to_string())
            }
        }
    }
}

#[async_trait]
impl StageHandler for ActionPlanStage {
    fn name(&self) -> StageName {
        StageName::GenerateActionPlans
    }

    fn replay(&self) -> Replay {
        Replay::LastWriteWins
    }

    fn is_satisfied(&self, state: &SessionState) -> bool {
        state.action_plan_path.is_some()
    }

    async fn execute(
        &self,
        state: &SessionState,
        ctx: &StageContext,
    ) -> Result<StatePatch, WorkflowError> {
        let selected = state
            .selected_ideas
            .as_ref()
            .ok_or_else(|| WorkflowError::precondition(self.name(), "selected_ideas"))?;

        let mut document = format!("# Action Plans: {}\n\n", state.company_name);
        for (i, ranked) in selected.iter().enumerate() {
            let plan = self.plan_for(state, ctx, ranked).await?;
            document.push_str(&format!("## {}. {}\n\n", i + 1, ranked.idea.title));
            document.push_str(&format!("_Composite score: {:.1}_\n\n", ranked.score));
            document.push_str(&plan);
            document.push_str("\n\n---\n\n");
        }

        let path = action_plan_path(&ctx.settings.artifacts_dir, &state.session_id, ctx.settings.top_k);
        atomic_write(&path, &document).map_err(|e| {
            WorkflowError::Artifact(format!(
                "Failed to write action plans '{}': {}",
                path.display(),
                e
            ))
        })?;
        log::info!(
            "[{}] {} action plan(s) written to {}",
            state.session_id,
            selected.len(),
            path.display()
        );

        Ok(StatePatch::new().with_action_plan_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ScriptedGenerator, StaticSearch};
    use crate::error::GenerationError;
    use crate::models::{Competency, Idea, TechnologyLevel};
    use crate::ranking::{IdeaEvaluation, Priority};
    use crate::stages::test_support::context;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ranked(idea: Idea, score: f64) -> RankedIdea {
        RankedIdea {
            evaluation: IdeaEvaluation {
                idea_id: idea.id.clone(),
                title: idea.title.clone(),
                strategic_fit: 4,
                market_attractiveness: 4,
                technical_feasibility: 4,
                priority: Priority::High,
            },
            idea,
            score,
        }
    }

    #[tokio::test]
    async fn test_writes_sections_and_placeholder() {
        let temp_dir = TempDir::new().unwrap();
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("### Executive Summary\nLease batteries.\n".into()),
            Err(GenerationError::Http {
                status: 500,
                body: "boom".into(),
            }),
        ]));
        let ctx = context(generator.clone(), Arc::new(StaticSearch::empty()), temp_dir.path());

        let mut state = SessionState::new("Acme");
        let sid = state.session_id.clone();
        let battery = Competency::new(&sid, "Energy", "Battery packs", "", TechnologyLevel::Advanced);
        let mut leasing = Idea::new(&sid, "Battery leasing");
        leasing.related_competencies = vec![battery.id.clone()];
        state.competencies = Some(vec![battery]);
        state.selected_ideas = Some(vec![
            ranked(leasing, 30.0),
            ranked(Idea::new(&sid, "Grid storage"), 28.0),
        ]);

        let path = ActionPlanStage
            .execute(&state, &ctx)
            .await
            .unwrap()
            .action_plan_path
            .unwrap();
        assert!(path.ends_with(format!("{}_top3_action_plans.md", sid)));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Action Plans: Acme"));
        assert!(content.contains("## 1. Battery leasing"));
        assert!(content.contains("Lease batteries."));
        assert!(content.contains("## 2. Grid storage"));
        assert!(content.contains(PLAN_FAILED_PLACEHOLDER));
        assert_eq!(content.matches("---").count(), 2);

        assert!(generator.prompts()[0].contains("Related competencies: Battery packs"));
    }

    #[tokio::test]
    async fn test_requires_selection() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(
            Arc::new(ScriptedGenerator::new(vec![])),
            Arc::new(StaticSearch::empty()),
            temp_dir.path(),
        );
        let err = ActionPlanStage
            .execute(&SessionState::new("Acme"), &ctx)
            .await
            .unwrap_err();
        assert!(err.is_precondition());
    }
}
