// generate_template: evaluation sheet the human fills in

use super::{Replay, StageContext, StageHandler};
use crate::error::WorkflowError;
use crate::ranking::EvaluationSheet;
use crate::utils::{atomic_write, evaluation_template_path};
use crate::workflow::{SessionState, StageName, StatePatch};
use async_trait::async_trait;

pub struct TemplateStage;

#[async_trait]
impl StageHandler for TemplateStage {
    fn name(&self) -> StageName {
        StageName::GenerateTemplate
    }

    fn replay(&self) -> Replay {
        Replay::Idempotent
    }

    fn is_satisfied(&self, state: &SessionState) -> bool {
        state.evaluation_path.is_some()
    }

    async fn execute(
        &self,
        state: &SessionState,
        ctx: &StageContext,
    ) -> Result<StatePatch, WorkflowError> {
        let ideas = state
            .ideas
            .as_ref()
            .ok_or_else(|| WorkflowError::precondition(self.name(), "ideas"))?;

        let sheet = EvaluationSheet::for_ideas(&state.session_id, &state.company_name, ideas);
        let path = evaluation_template_path(&ctx.settings.artifacts_dir, &state.session_id);
        atomic_write(&path, &sheet.to_yaml()?).map_err(|e| {
            WorkflowError::Artifact(format!(
                "Failed to write evaluation sheet '{}': {}",
                path.display(),
                e
            ))
        })?;
        log::info!(
            "[{}] Evaluation sheet with {} rows written to {}",
            state.session_id,
            ideas.len(),
            path.display()
        );

        Ok(StatePatch::new().with_evaluation_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ScriptedGenerator, StaticSearch};
    use crate::models::Idea;
    use crate::stages::test_support::context;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_writes_one_blank_row_per_idea() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(
            Arc::new(ScriptedGenerator::new(vec![])),
            Arc::new(StaticSearch::empty()),
            &temp_dir.path().join("artifacts"),
        );
        let mut state = SessionState::new("Acme");
        let mut idea = Idea::new(&state.session_id, "Battery leasing");
        idea.application_area = "Mobility".into();
        state.ideas = Some(vec![idea.clone(), Idea::new(&state.session_id, "Grid storage")]);

        let path = TemplateStage
            .execute(&state, &ctx)
            .await
            .unwrap()
            .evaluation_path
            .unwrap();
        assert!(path.ends_with(format!("{}_evaluation_template.yaml", state.session_id)));

        let sheet = EvaluationSheet::load(&path).unwrap();
        assert_eq!(sheet.company_name, "Acme");
        assert_eq!(sheet.ideas.len(), 2);
        assert_eq!(sheet.ideas[0].idea_id, idea.id);
        assert_eq!(sheet.ideas[0].application_area, "Mobility");
        assert!(sheet.ideas.iter().all(|r| r.is_unscored()));
    }

    #[tokio::test]
    async fn test_requires_ideas() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(
            Arc::new(ScriptedGenerator::new(vec![])),
            Arc::new(StaticSearch::empty()),
            temp_dir.path(),
        );
        let err = TemplateStage
            .execute(&SessionState::new("Acme"), &ctx)
            .await
            .unwrap_err();
        assert!(err.is_precondition());
    }
}
