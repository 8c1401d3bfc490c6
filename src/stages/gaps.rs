// resolve_gaps: fold clarifications into the competencies and ask what is still missing

use super::{Replay, StageContext, StageHandler};
use crate::error::WorkflowError;
use crate::extraction::competencies_from_values;
use crate::models::{Clarification, Competency, TechnologyLevel};
use crate::prompts::builtin;
use crate::records::{replace_session_records, Collection};
use crate::utils::normalize_question;
use crate::workflow::{SessionState, StageName, StatePatch};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;

/// Competencies shown to the gap-analysis prompt
const GAP_PROMPT_COMPETENCIES: usize = 20;

const CHIP_QUESTION: &str = "Do you have in-house chip design or specialized hardware capabilities?";
const MANUFACTURING_QUESTION: &str =
    "Do you have in-house manufacturing capabilities (e.g., large-scale factories)?";

const SILICON_KEYWORDS: &[&str] = &["chip", "semiconductor", "silicon", "processor"];

/// Competencies implied by clarification answers when refinement yields nothing
pub fn clarification_heuristics(session_id: &str, clarifications: &[Clarification]) -> Vec<Competency> {
    let mentions_silicon = clarifications.iter().any(|c| {
        let answer = c.answer.to_lowercase();
        SILICON_KEYWORDS.iter().any(|k| answer.contains(k))
    });

    if mentions_silicon {
        vec![Competency::new(
            session_id,
            "Product & Technology",
            "Custom Silicon Design",
            "In-house chip design confirmed by clarification",
            TechnologyLevel::Advanced,
        )]
    } else {
        Vec::new()
    }
}

/// Questions asked when the collaborator proposes none
pub fn heuristic_questions(competencies: &[Competency]) -> Vec<String> {
    let names: Vec<String> = competencies
        .iter()
        .map(|c| c.competency.to_lowercase())
        .collect();

    let mut questions = Vec::new();
    if !names.iter().any(|n| n.contains("chip") || n.contains("silicon")) {
        questions.push(CHIP_QUESTION.to_string());
    }
    if !names.iter().any(|n| n.contains("manufact")) {
        questions.push(MANUFACTURING_QUESTION.to_string());
    }
    questions
}

/// Questions and the completion flag from a gap-analysis reply.
/// Accepts `{questions, complete}` or a bare array of strings.
fn parse_gap_reply(value: &Value) -> (Vec<String>, bool) {
    let strings = |items: &Vec<Value>| -> Vec<String> {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect()
    };

    match value {
        Value::Array(items) => (strings(items), false),
        Value::Object(map) => {
            let questions = map
                .get("questions")
                .and_then(Value::as_array)
                .map(strings)
                .unwrap_or_default();
            let complete = map.get("complete").and_then(Value::as_bool).unwrap_or(false);
            (questions, complete)
        }
        _ => (Vec::new(), false),
    }
}

pub struct ResolveGapsStage;

impl ResolveGapsStage {
    /// Re-extract with the clarifications. Never empties the competency list.
    async fn refine(
        &self,
        state: &SessionState,
        ctx: &StageContext,
        previous: &[Competency],
    ) -> Result<Vec<Competency>, WorkflowError> {
        let mut context = tera::Context::new();
        context.insert("snippets", &state.snippets.clone().unwrap_or_default());
        context.insert("clarifications", &state.clarifications);
        let prompt = ctx.render(builtin::COMPETENCY_REFINEMENT, &context)?;

        let refined = match ctx.extractor.extract_structured(&prompt).await {
            Ok(extraction) => extraction
                .value
                .as_ref()
                .map(|v| competencies_from_values(&state.session_id, v))
                .unwrap_or_default(),
            Err(e) => {
                log::warn!("[{}] Refinement call failed: {}", state.session_id, e);
                Vec::new()
            }
        };

        if !refined.is_empty() {
            return Ok(refined);
        }

        let known: HashSet<String> = previous.iter().map(|c| c.competency.to_lowercase()).collect();
        let extra: Vec<Competency> = clarification_heuristics(&state.session_id, state.pending_clarifications())
            .into_iter()
            .filter(|c| !known.contains(&c.competency.to_lowercase()))
            .collect();
        if extra.is_empty() {
            log::info!(
                "[{}] Refinement produced nothing, keeping previous competencies",
                state.session_id
            );
            return Ok(previous.to_vec());
        }
        let mut competencies = previous.to_vec();
        competencies.extend(extra);
        Ok(competencies)
    }

    async fn ask_questions(
        &self,
        state: &SessionState,
        ctx: &StageContext,
        competencies: &[Competency],
    ) -> Result<Vec<String>, WorkflowError> {
        let shown: Vec<&Competency> = competencies.iter().take(GAP_PROMPT_COMPETENCIES).collect();
        let mut context = tera::Context::new();
        context.insert("competencies", &shown);
        context.insert("answered", &state.answered_questions());
        let prompt = ctx.render(builtin::GAP_ANALYSIS, &context)?;

        let (questions, complete) = match ctx.extractor.extract_structured(&prompt).await {
            Ok(extraction) => extraction
                .value
                .as_ref()
                .map(parse_gap_reply)
                .unwrap_or_default(),
            Err(e) => {
                log::warn!("[{}] Gap analysis call failed: {}", state.session_id, e);
                (Vec::new(), false)
            }
        };

        if complete {
            log::info!("[{}] Gap analysis reports the list complete", state.session_id);
            return Ok(Vec::new());
        }
        if questions.is_empty() {
            return Ok(heuristic_questions(competencies));
        }
        Ok(questions)
    }
}

#[async_trait]
impl StageHandler for ResolveGapsStage {
    fn name(&self) -> StageName {
        StageName::ResolveGaps
    }

    fn replay(&self) -> Replay {
        Replay::LastWriteWins
    }

    fn is_satisfied(&self, state: &SessionState) -> bool {
        state.gap_questions.is_some() && state.pending_clarifications().is_empty()
    }

    async fn execute(
        &self,
        state: &SessionState,
        ctx: &StageContext,
    ) -> Result<StatePatch, WorkflowError> {
        let previous = state
            .competencies
            .as_ref()
            .ok_or_else(|| WorkflowError::precondition(self.name(), "competencies"))?;

        let mut patch = StatePatch::new();
        let mut competencies = previous.clone();

        if !state.pending_clarifications().is_empty() {
            log::info!(
                "[{}] Applying {} new clarification(s)",
                state.session_id,
                state.pending_clarifications().len()
            );
            competencies = self.refine(state, ctx, previous).await?;
            replace_session_records(
                ctx.records.as_ref(),
                Collection::Competencies,
                &state.session_id,
                &competencies,
            )?;
            patch = patch
                .with_competencies(competencies.clone())
                .with_clarifications_applied(state.clarifications.len());
        }

        if state.gaps_resolved {
            return Ok(patch.with_gap_questions(Vec::new()));
        }

        let asked: HashSet<String> = state
            .clarifications
            .iter()
            .map(|c| normalize_question(&c.question))
            .collect();
        let questions: Vec<String> = self
            .ask_questions(state, ctx, &competencies)
            .await?
            .into_iter()
            .filter(|q| !asked.contains(&normalize_question(q)))
            .collect();

        // The same non-empty set twice in a row would loop forever
        let repeated = !questions.is_empty() && state.gap_questions.as_ref() == Some(&questions);
        if repeated {
            log::info!(
                "[{}] Gap questions unchanged since last round, treating as resolved",
                state.session_id
            );
            return Ok(patch.with_gap_questions(Vec::new()));
        }

        log::info!("[{}] {} gap question(s)", state.session_id, questions.len());
        Ok(patch.with_gap_questions(questions))
    }
}
