// select_ideas: rank the human-scored ideas

use super::{Replay, StageContext, StageHandler};
use crate::error::WorkflowError;
use crate::ranking::rank_ideas;
use crate::workflow::{SessionState, StageName, StatePatch};
use async_trait::async_trait;

pub struct SelectIdeasStage;

#[async_trait]
impl StageHandler for SelectIdeasStage {
    fn name(&self) -> StageName {
        StageName::SelectIdeas
    }

    fn replay(&self) -> Replay {
        Replay::Idempotent
    }

    fn is_satisfied(&self, state: &SessionState) -> bool {
        state.selected_ideas.is_some()
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
        let evaluations = state
            .evaluations
            .as_ref()
            .ok_or_else(|| WorkflowError::precondition(self.name(), "evaluations"))?;

        let selected = rank_ideas(ideas, evaluations, &ctx.settings.weights, ctx.settings.top_k);
        if selected.is_empty() {
            return Err(WorkflowError::InvalidEvaluation(
                "no evaluation matches a generated idea".to_string(),
            ));
        }

        for (rank, r) in selected.iter().enumerate() {
            log::info!(
                "[{}] #{} {} (score {:.1})",
                state.session_id,
                rank + 1,
                r.idea.title,
                r.score
            );
        }
        Ok(StatePatch::new().with_selected_ideas(selected))
    }
}
