//! Static stage graph and declared pause points

use crate::error::WorkflowError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Workflow stages, in graph order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Web search about the company
    Search,
    /// Competency extraction from the snippets
    Extract,
    /// Clarification loop with the human
    ResolveGaps,
    /// Idea generation from validated competencies
    GenerateIdeas,
    /// Evaluation sheet for the human to score
    GenerateTemplate,
    /// Ranking of the scored ideas
    SelectIdeas,
    /// Action plans for the selected ideas
    GenerateActionPlans,
}

impl StageName {
    /// Get all stages in order
    pub fn all() -> &'static [StageName] {
        &[
            StageName::Search,
            StageName::Extract,
            StageName::ResolveGaps,
            StageName::GenerateIdeas,
            StageName::GenerateTemplate,
            StageName::SelectIdeas,
            StageName::GenerateActionPlans,
        ]
    }

    /// Get the next stage, if any
    pub fn next(&self) -> Option<StageName> {
        StageName::all().get(self.index() + 1).copied()
    }

    /// Get the stage index (0-based)
    pub fn index(&self) -> usize {
        match self {
            StageName::Search => 0,
            StageName::Extract => 1,
            StageName::ResolveGaps => 2,
            StageName::GenerateIdeas => 3,
            StageName::GenerateTemplate => 4,
            StageName::SelectIdeas => 5,
            StageName::GenerateActionPlans => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Search => "search",
            StageName::Extract => "extract",
            StageName::ResolveGaps => "resolve_gaps",
            StageName::GenerateIdeas => "generate_ideas",
            StageName::GenerateTemplate => "generate_template",
            StageName::SelectIdeas => "select_ideas",
            StageName::GenerateActionPlans => "generate_action_plans",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StageName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageName::all()
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown stage: '{}'", s))
    }
}

/// The ordered stage sequence plus the stages execution may stop before
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    stages: Vec<StageName>,
    pause_points: BTreeSet<StageName>,
}

impl WorkflowGraph {
    /// search → extract → resolve_gaps → generate_ideas → generate_template
    /// → select_ideas → generate_action_plans, pausable before
    /// `generate_ideas` (clarification) and `select_ideas` (scoring).
    pub fn standard() -> Self {
        Self {
            stages: StageName::all().to_vec(),
            pause_points: [StageName::GenerateIdeas, StageName::SelectIdeas]
                .into_iter()
                .collect(),
        }
    }

    pub fn stages(&self) -> &[StageName] {
        &self.stages
    }

    pub fn pause_points(&self) -> &BTreeSet<StageName> {
        &self.pause_points
    }

    pub fn is_pause_point(&self, stage: StageName) -> bool {
        self.pause_points.contains(&stage)
    }

    /// Reject pause requests for stages that are not declared pause points
    pub fn validate_pause_before(&self, pause_before: &BTreeSet<StageName>) -> Result<(), WorkflowError> {
        match pause_before.iter().find(|s| !self.is_pause_point(**s)) {
            Some(stage) => Err(WorkflowError::InvalidPausePoint(*stage)),
            None => Ok(()),
        }
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::standard()
    }
}
