// extract: competencies from the search snippets

use super::{Replay, StageContext, StageHandler};
use crate::error::WorkflowError;
use crate::extraction::competencies_from_values;
use crate::models::{Competency, Snippet, TechnologyLevel};
use crate::prompts::builtin;
use crate::records::{replace_session_records, Collection};
use crate::workflow::{SessionState, StageName, StatePatch};
use async_trait::async_trait;

const FALLBACK_CATEGORY: &str = "Product & Technology";

/// Keyword heuristics used when no structured data could be recovered.
/// Always returns at least one competency.
pub fn fallback_competencies(session_id: &str, company: &str, snippets: &[Snippet]) -> Vec<Competency> {
    let text = snippets
        .iter()
        .map(|s| s.text.to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");

    let mut competencies = Vec::new();
    if text.contains("electric") {
        competencies.push(Competency::new(
            session_id,
            FALLBACK_CATEGORY,
            "Electric Powertrains",
            "High-efficiency battery and motor systems",
            TechnologyLevel::Advanced,
        ));
    }
    if text.contains("autonomous") {
        competencies.push(Competency::new(
            session_id,
            FALLBACK_CATEGORY,
            "Autonomous Driving",
            "AI-based self-driving technology",
            TechnologyLevel::CuttingEdge,
        ));
    }
    if competencies.is_empty() {
        competencies.push(Competency::new(
            session_id,
            FALLBACK_CATEGORY,
            "Core Products",
            format!("Key products of {}", company),
            TechnologyLevel::Intermediate,
        ));
    }
    competencies
}

pub struct ExtractStage;

#[async_trait]
impl StageHandler for ExtractStage {
    fn name(&self) -> StageName {
        StageName::Extract
    }

    fn replay(&self) -> Replay {
        Replay::LastWriteWins
    }

    fn is_satisfied(&self, state: &SessionState) -> bool {
        state.competencies.is_some()
    }

    async fn execute(
        &self,
        state: &SessionState,
        ctx: &StageContext,
    ) -> Result<StatePatch, WorkflowError> {
        let snippets = state
            .snippets
            .as_ref()
            .ok_or_else(|| WorkflowError::precondition(self.name(), "snippets"))?;

        let mut context = tera::Context::new();
        context.insert("snippets", snippets);
        let prompt = ctx.render(builtin::COMPETENCY_EXTRACTION, &context)?;

        let extraction = ctx.extractor.extract_structured(&prompt).await?;
        let mut competencies = extraction
            .value
            .as_ref()
            .map(|v| competencies_from_values(&state.session_id, v))
            .unwrap_or_default();

        if competencies.is_empty() {
            log::warn!(
                "[{}] No competencies recoverable, using keyword heuristics",
                state.session_id
            );
            competencies = fallback_competencies(&state.session_id, &state.company_name, snippets);
        }

        replace_session_records(
            ctx.records.as_ref(),
            Collection::Competencies,
            &state.session_id,
            &competencies,
        )?;
        log::info!(
            "[{}] Extracted {} competencies",
            state.session_id,
            competencies.len()
        );

        // Any clarifications must be folded into the fresh list again
        Ok(StatePatch::new()
            .with_competencies(competencies)
            .with_clarifications_applied(0))
    }
}
