//! Session state, stage patches and the explicit stage cursor

use super::graph::StageName;
use crate::error::WorkflowError;
use crate::models::{Clarification, Competency, Idea, Snippet};
use crate::ranking::{IdeaEvaluation, RankedIdea};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Answer that closes the clarification loop
pub const COMPLETION_TOKEN: &str = "COMPLETE";

/// Whether an answer is the completion token (case-insensitive)
pub fn is_completion_token(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case(COMPLETION_TOKEN)
}

/// Furthest stage outcome recorded for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCursor {
    Search,
    Extracted,
    AwaitingClarification,
    IdeasGenerated,
    TemplateGenerated,
    IdeasSelected,
    ActionPlansGenerated,
}

impl StageCursor {
    /// Cursor reached once `stage` has completed
    pub fn after(stage: StageName) -> StageCursor {
        match stage {
            StageName::Search => StageCursor::Search,
            StageName::Extract => StageCursor::Extracted,
            StageName::ResolveGaps => StageCursor::AwaitingClarification,
            StageName::GenerateIdeas => StageCursor::IdeasGenerated,
            StageName::GenerateTemplate => StageCursor::TemplateGenerated,
            StageName::SelectIdeas => StageCursor::IdeasSelected,
            StageName::GenerateActionPlans => StageCursor::ActionPlansGenerated,
        }
    }

    /// Stage whose completion this cursor records
    pub fn stage(&self) -> StageName {
        match self {
            StageCursor::Search => StageName::Search,
            StageCursor::Extracted => StageName::Extract,
            StageCursor::AwaitingClarification => StageName::ResolveGaps,
            StageCursor::IdeasGenerated => StageName::GenerateIdeas,
            StageCursor::TemplateGenerated => StageName::GenerateTemplate,
            StageCursor::IdeasSelected => StageName::SelectIdeas,
            StageCursor::ActionPlansGenerated => StageName::GenerateActionPlans,
        }
    }

    pub fn index(&self) -> usize {
        self.stage().index()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageCursor::ActionPlansGenerated)
    }
}

/// Validates if the cursor can move from one position to another
pub fn can_transition(from: Option<StageCursor>, to: StageCursor) -> bool {
    match from {
        // Nothing has run yet: only the first stage can complete
        None => to == StageCursor::Search,
        // Same position: replayed stage or another clarification round
        Some(a) if a == to => true,
        // One step forward
        Some(a) if to.index() == a.index() + 1 => true,
        // Manual re-run of an earlier stage rewinds the cursor
        Some(a) if to.index() < a.index() => true,
        _ => false,
    }
}

/// Validates and performs a cursor transition
pub fn transition_cursor(
    current: Option<StageCursor>,
    target: StageCursor,
) -> Result<StageCursor, WorkflowError> {
    if !can_transition(current, target) {
        return Err(WorkflowError::InvalidTransition {
            from: current,
            to: target,
        });
    }
    Ok(target)
}

/// Get all valid next cursor positions
pub fn valid_next_cursors(current: Option<StageCursor>) -> Vec<StageCursor> {
    StageName::all()
        .iter()
        .map(|s| StageCursor::after(*s))
        .filter(|c| can_transition(current, *c))
        .collect()
}

/// Record of a completed stage execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub completed_at: DateTime<Utc>,
    /// How many times the stage has executed for this session
    pub runs: u32,
    /// State fields written by the latest execution
    pub fields: Vec<String>,
}

/// Per-session progress, mutated only by merging stage patches or by caller input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub company_name: String,
    pub snippets: Option<Vec<Snippet>>,
    pub competencies: Option<Vec<Competency>>,
    /// Human answers, appended per round
    #[serde(default)]
    pub clarifications: Vec<Clarification>,
    /// Number of clarifications already folded into `competencies`
    #[serde(default)]
    pub clarifications_applied: usize,
    pub gap_questions: Option<Vec<String>>,
    /// Set when the human submits the completion token
    #[serde(default)]
    pub gaps_resolved: bool,
    pub ideas: Option<Vec<Idea>>,
    pub evaluation_path: Option<PathBuf>,
    pub evaluations: Option<Vec<IdeaEvaluation>>,
    pub selected_ideas: Option<Vec<RankedIdea>>,
    pub action_plan_path: Option<PathBuf>,
    pub cursor: Option<StageCursor>,
    #[serde(default)]
    pub checkpoints: BTreeMap<StageName, Checkpoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Create a session with a fresh identifier
    pub fn new(company_name: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), company_name)
    }

    pub fn with_id(session_id: impl Into<String>, company_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            company_name: company_name.into(),
            snippets: None,
            competencies: None,
            clarifications: Vec::new(),
            clarifications_applied: 0,
            gap_questions: None,
            gaps_resolved: false,
            ideas: None,
            evaluation_path: None,
            evaluations: None,
            selected_ideas: None,
            action_plan_path: None,
            cursor: None,
            checkpoints: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a patch: only fields present in the patch are written
    pub fn apply(&mut self, patch: StatePatch) {
        if let Some(v) = patch.snippets {
            self.snippets = Some(v);
        }
        if let Some(v) = patch.competencies {
            self.competencies = Some(v);
        }
        if let Some(v) = patch.clarifications_applied {
            self.clarifications_applied = v;
        }
        if let Some(v) = patch.gap_questions {
            self.gap_questions = Some(v);
        }
        if let Some(v) = patch.gaps_resolved {
            self.gaps_resolved = v;
        }
        if let Some(v) = patch.ideas {
            self.ideas = Some(v);
        }
        if let Some(v) = patch.evaluation_path {
            self.evaluation_path = Some(v);
        }
        if let Some(v) = patch.selected_ideas {
            self.selected_ideas = Some(v);
        }
        if let Some(v) = patch.action_plan_path {
            self.action_plan_path = Some(v);
        }
        self.touch();
    }

    /// Record a completed stage and advance the cursor
    pub fn record_checkpoint(&mut self, stage: StageName, fields: Vec<String>) -> Result<(), WorkflowError> {
        self.cursor = Some(transition_cursor(self.cursor, StageCursor::after(stage))?);
        let runs = self.checkpoints.get(&stage).map(|c| c.runs).unwrap_or(0) + 1;
        self.checkpoints.insert(
            stage,
            Checkpoint {
                completed_at: Utc::now(),
                runs,
                fields,
            },
        );
        self.touch();
        Ok(())
    }

    /// Move the cursor past a stage whose checkpoint is already satisfied
    pub fn advance_past(&mut self, stage: StageName) -> Result<(), WorkflowError> {
        let target = StageCursor::after(stage);
        if self.cursor.map_or(true, |c| c < target) {
            self.cursor = Some(transition_cursor(self.cursor, target)?);
        }
        Ok(())
    }

    /// Replace the competency list with a human-validated one. This closes the
    /// clarification loop and discards anything derived from the old list.
    pub fn accept_validated_competencies(&mut self, competencies: Vec<Competency>) -> Result<(), WorkflowError> {
        self.competencies = Some(competencies);
        self.clarifications_applied = self.clarifications.len();
        self.gap_questions = Some(Vec::new());
        self.gaps_resolved = true;

        self.ideas = None;
        self.evaluation_path = None;
        self.evaluations = None;
        self.selected_ideas = None;
        self.action_plan_path = None;
        let validated = StageCursor::AwaitingClarification;
        if self.cursor.map_or(false, |c| c > validated) {
            self.cursor = Some(transition_cursor(self.cursor, validated)?);
        }
        self.touch();
        Ok(())
    }

    /// Number of times a stage has executed
    pub fn runs_of(&self, stage: StageName) -> u32 {
        self.checkpoints.get(&stage).map(|c| c.runs).unwrap_or(0)
    }

    /// Append human answers. An answer equal to the completion token closes the
    /// clarification loop and is not stored. Returns true if the loop was closed.
    pub fn record_clarifications(&mut self, answers: Vec<Clarification>) -> bool {
        let mut completed = false;
        for answer in answers {
            if is_completion_token(&answer.answer) || is_completion_token(&answer.question) {
                completed = true;
                continue;
            }
            self.clarifications.push(answer);
        }
        if completed {
            self.gaps_resolved = true;
        }
        self.touch();
        completed
    }

    /// Clarifications not yet folded into the competencies
    pub fn pending_clarifications(&self) -> &[Clarification] {
        let start = self.clarifications_applied.min(self.clarifications.len());
        &self.clarifications[start..]
    }

    /// Idea generation may proceed: human closed the loop or no questions remain
    pub fn clarification_gate_open(&self) -> bool {
        self.gaps_resolved
            || self
                .gap_questions
                .as_ref()
                .map_or(false, |q| q.is_empty())
    }

    /// Gap questions are outstanding and waiting for a human
    pub fn is_awaiting_clarification(&self) -> bool {
        self.gap_questions.is_some() && !self.clarification_gate_open()
    }

    /// Questions that already received a non-empty answer
    pub fn answered_questions(&self) -> Vec<String> {
        self.clarifications
            .iter()
            .filter(|c| !c.is_skipped())
            .map(|c| c.question.clone())
            .collect()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Partial state produced by a stage. `None` fields leave the state untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub snippets: Option<Vec<Snippet>>,
    pub competencies: Option<Vec<Competency>>,
    pub clarifications_applied: Option<usize>,
    pub gap_questions: Option<Vec<String>>,
    pub gaps_resolved: Option<bool>,
    pub ideas: Option<Vec<Idea>>,
    pub evaluation_path: Option<PathBuf>,
    pub selected_ideas: Option<Vec<RankedIdea>>,
    pub action_plan_path: Option<PathBuf>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snippets(mut self, snippets: Vec<Snippet>) -> Self {
        self.snippets = Some(snippets);
        self
    }

    pub fn with_competencies(mut self, competencies: Vec<Competency>) -> Self {
        self.competencies = Some(competencies);
        self
    }

    pub fn with_clarifications_applied(mut self, count: usize) -> Self {
        self.clarifications_applied = Some(count);
        self
    }

    pub fn with_gap_questions(mut self, questions: Vec<String>) -> Self {
        self.gap_questions = Some(questions);
        self
    }

    pub fn with_gaps_resolved(mut self, resolved: bool) -> Self {
        self.gaps_resolved = Some(resolved);
        self
    }

    pub fn with_ideas(mut self, ideas: Vec<Idea>) -> Self {
        self.ideas = Some(ideas);
        self
    }

    pub fn with_evaluation_path(mut self, path: PathBuf) -> Self {
        self.evaluation_path = Some(path);
        self
    }

    pub fn with_selected_ideas(mut self, selected: Vec<RankedIdea>) -> Self {
        self.selected_ideas = Some(selected);
        self
    }

    pub fn with_action_plan_path(mut self, path: PathBuf) -> Self {
        self.action_plan_path = Some(path);
        self
    }

    /// Names of the fields this patch writes
    pub fn touched_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        let mut mark = |present: bool, name: &str| {
            if present {
                fields.push(name.to_string());
            }
        };
        mark(self.snippets.is_some(), "snippets");
        mark(self.competencies.is_some(), "competencies");
        mark(self.clarifications_applied.is_some(), "clarifications_applied");
        mark(self.gap_questions.is_some(), "gap_questions");
        mark(self.gaps_resolved.is_some(), "gaps_resolved");
        mark(self.ideas.is_some(), "ideas");
        mark(self.evaluation_path.is_some(), "evaluation_path");
        mark(self.selected_ideas.is_some(), "selected_ideas");
        mark(self.action_plan_path.is_some(), "action_plan_path");
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.touched_fields().is_empty()
    }
}
