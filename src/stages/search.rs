// search: web snippets about the company

use super::{Replay, StageContext, StageHandler};
use crate::error::WorkflowError;
use crate::workflow::{SessionState, StageName, StatePatch};
use async_trait::async_trait;

pub struct SearchStage;

#[async_trait]
impl StageHandler for SearchStage {
    fn name(&self) -> StageName {
        StageName::Search
    }

    fn replay(&self) -> Replay {
        Replay::Idempotent
    }

    fn is_satisfied(&self, state: &SessionState) -> bool {
        state.snippets.is_some()
    }

    async fn execute(
        &self,
        state: &SessionState,
        ctx: &StageContext,
    ) -> Result<StatePatch, WorkflowError> {
        if state.company_name.trim().is_empty() {
            return Err(WorkflowError::precondition(self.name(), "company_name"));
        }

        log::info!("[{}] Searching for '{}'", state.session_id, state.company_name);
        let snippets = ctx
            .search
            .search(&state.company_name, ctx.settings.max_results)
            .await?;
        log::info!("[{}] {} snippets found", state.session_id, snippets.len());

        Ok(StatePatch::new().with_snippets(snippets))
    }
}
