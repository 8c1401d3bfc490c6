//! Session driver
//!
//! Maps the human-facing steps of a session (start, answer questions, close
//! the loop, generate ideas, submit scores, finish) onto engine runs with the
//! right pause points.

use super::engine::{RunOptions, RunReport, WorkflowEngine};
use super::graph::StageName;
use super::state::{SessionState, COMPLETION_TOKEN};
use crate::error::{WorkflowError, WorkflowResult};
use crate::extraction::competency_from_row;
use crate::models::{Clarification, Competency, CompetencyRow, Idea};
use crate::records::{replace_session_records, Collection};
use crate::ranking::{validate_rows, EvaluationRow, EvaluationSheet, IdeaEvaluation, RankedIdea};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Whether the clarification loop needs another round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStatus {
    Continue,
    Complete,
}

/// Result of a clarification round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationRound {
    pub session_id: String,
    pub questions: Vec<String>,
    pub status: LoopStatus,
    pub competencies: Vec<Competency>,
}

impl ClarificationRound {
    fn from_state(state: &SessionState) -> Self {
        let status = if state.clarification_gate_open() {
            LoopStatus::Complete
        } else {
            LoopStatus::Continue
        };
        let questions = match status {
            LoopStatus::Complete => Vec::new(),
            LoopStatus::Continue => state.gap_questions.clone().unwrap_or_default(),
        };
        Self {
            session_id: state.session_id.clone(),
            questions,
            status,
            competencies: state.competencies.clone().unwrap_or_default(),
        }
    }
}

/// Ideas plus the evaluation sheet to score them in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeasReady {
    pub session_id: String,
    pub ideas: Vec<Idea>,
    pub evaluation_path: PathBuf,
}

/// Final outcome of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub session_id: String,
    pub selected: Vec<RankedIdea>,
    pub action_plan_path: PathBuf,
}

#[derive(Clone)]
pub struct SessionManager {
    engine: Arc<WorkflowEngine>,
}

impl SessionManager {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    /// Create a session and run it up to the clarification pause
    pub async fn start(&self, company_name: &str) -> WorkflowResult<ClarificationRound> {
        let state = self.engine.create_session(company_name).await?;
        self.clarification_round(&state.session_id).await
    }

    /// Record answers to the current gap questions and run another round
    pub async fn answer_clarifications(
        &self,
        session_id: &str,
        answers: Vec<Clarification>,
    ) -> WorkflowResult<ClarificationRound> {
        let closed = self
            .engine
            .update(session_id, |state| Ok(state.record_clarifications(answers)))
            .await?;
        if closed {
            log::info!("[{}] Clarification loop closed by the human", session_id);
        }
        self.clarification_round(session_id).await
    }

    /// Close the clarification loop explicitly
    pub async fn complete_clarifications(&self, session_id: &str) -> WorkflowResult<ClarificationRound> {
        self.answer_clarifications(session_id, vec![Clarification::new("", COMPLETION_TOKEN)])
            .await
    }

    async fn clarification_round(&self, session_id: &str) -> WorkflowResult<ClarificationRound> {
        let report = self.engine.run(session_id, &[StageName::GenerateIdeas]).await?;
        Ok(ClarificationRound::from_state(&report.state))
    }

    /// Replace the extracted competencies with a human-reviewed list. Levels are
    /// normalized, the records are replaced and the clarification loop is closed;
    /// ideas generated from the previous list are discarded.
    pub async fn submit_competencies(
        &self,
        session_id: &str,
        rows: &[CompetencyRow],
    ) -> WorkflowResult<Vec<Competency>> {
        let competencies: Vec<Competency> = rows
            .iter()
            .filter_map(|row| competency_from_row(session_id, row))
            .collect();
        if competencies.is_empty() {
            return Err(WorkflowError::precondition(
                StageName::GenerateIdeas,
                "at least one named competency",
            ));
        }

        let records = self.engine.context().records.clone();
        let accepted = competencies.clone();
        self.engine
            .update(session_id, move |state| {
                if state.competencies.is_none() {
                    return Err(WorkflowError::precondition(StageName::ResolveGaps, "competencies"));
                }
                replace_session_records(
                    records.as_ref(),
                    Collection::Competencies,
                    &state.session_id,
                    &accepted,
                )?;
                if state.ideas.is_some() {
                    replace_session_records::<Idea>(
                        records.as_ref(),
                        Collection::Ideas,
                        &state.session_id,
                        &[],
                    )?;
                }
                state.accept_validated_competencies(accepted)
            })
            .await?;
        log::info!("[{}] {} validated competencies submitted", session_id, competencies.len());
        Ok(competencies)
    }

    /// Generate ideas and the evaluation sheet, pausing before selection
    pub async fn generate_ideas(&self, session_id: &str) -> WorkflowResult<IdeasReady> {
        let report = self.engine.run(session_id, &[StageName::SelectIdeas]).await?;
        let state = report.state;
        let ideas = state
            .ideas
            .ok_or_else(|| WorkflowError::precondition(StageName::GenerateTemplate, "ideas"))?;
        let evaluation_path = state
            .evaluation_path
            .ok_or_else(|| WorkflowError::precondition(StageName::SelectIdeas, "evaluation_path"))?;
        Ok(IdeasReady {
            session_id: state.session_id,
            ideas,
            evaluation_path,
        })
    }

    /// Validate and store scored rows. Any previous selection is discarded.
    pub async fn submit_evaluations(
        &self,
        session_id: &str,
        rows: &[EvaluationRow],
    ) -> WorkflowResult<Vec<IdeaEvaluation>> {
        let evaluations = validate_rows(rows)?;
        let stored = evaluations.clone();
        self.engine
            .update(session_id, move |state| {
                if state.ideas.is_none() {
                    return Err(WorkflowError::precondition(StageName::SelectIdeas, "ideas"));
                }
                state.evaluations = Some(stored);
                state.selected_ideas = None;
                state.action_plan_path = None;
                Ok(())
            })
            .await?;
        log::info!("[{}] {} evaluation(s) submitted", session_id, evaluations.len());
        Ok(evaluations)
    }

    /// Rows of a filled-in evaluation sheet
    pub fn load_evaluations(path: &Path) -> WorkflowResult<Vec<EvaluationRow>> {
        Ok(EvaluationSheet::load(path)?.ideas)
    }

    /// Load a filled-in sheet and submit its rows
    pub async fn submit_evaluation_file(
        &self,
        session_id: &str,
        path: &Path,
    ) -> WorkflowResult<Vec<IdeaEvaluation>> {
        let sheet = EvaluationSheet::load(path)?;
        if sheet.session_id != session_id {
            log::warn!(
                "[{}] Evaluation sheet '{}' belongs to session {}",
                session_id,
                path.display(),
                sheet.session_id
            );
        }
        self.submit_evaluations(session_id, &sheet.ideas).await
    }

    /// Select the top ideas and write their action plans
    pub async fn finish(&self, session_id: &str) -> WorkflowResult<Completion> {
        let report = self
            .engine
            .run_with(session_id, RunOptions::to_completion())
            .await?;
        let state = report.state;
        let selected = state
            .selected_ideas
            .ok_or_else(|| WorkflowError::precondition(StageName::GenerateActionPlans, "selected_ideas"))?;
        let action_plan_path = state
            .action_plan_path
            .ok_or_else(|| WorkflowError::precondition(StageName::GenerateActionPlans, "action_plan_path"))?;
        Ok(Completion {
            session_id: state.session_id,
            selected,
            action_plan_path,
        })
    }

    /// Execute `stage` again, and the stages after it up to the next pause point
    pub async fn rerun(&self, session_id: &str, stage: StageName) -> WorkflowResult<RunReport> {
        let pause_before: Vec<StageName> = self
            .engine
            .graph()
            .pause_points()
            .iter()
            .copied()
            .filter(|p| p.index() > stage.index())
            .collect();
        log::info!("[{}] Manual re-run of '{}'", session_id, stage);
        self.engine
            .run_with(session_id, RunOptions::pause_before(&pause_before).with_rerun(stage))
            .await
    }

    pub async fn snapshot(&self, session_id: &str) -> WorkflowResult<SessionState> {
        self.engine.get(session_id).await
    }
}
