// Human scoring of ideas and top-k selection

use crate::error::WorkflowError;
use crate::models::Idea;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

/// Composite score weights, configurable under `ranking` in the config file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringWeights {
    pub strategic_fit: f64,
    pub market_attractiveness: f64,
    pub technical_feasibility: f64,
    /// Multiplier applied to the priority value (High=3, Medium=2, Low=1)
    pub priority: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            strategic_fit: 3.0,
            market_attractiveness: 2.0,
            technical_feasibility: 1.0,
            priority: 2.0,
        }
    }
}

/// Human-assigned priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn value(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    /// Accepts H/M/L and High/Medium/Low, case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "h" | "high" => Ok(Priority::High),
            "m" | "medium" => Ok(Priority::Medium),
            "l" | "low" => Ok(Priority::Low),
            other => Err(format!(
                "Invalid priority '{}'. Expected H, M, L, High, Medium or Low",
                other
            )),
        }
    }
}

/// A validated evaluation of one idea
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaEvaluation {
    #[serde(default)]
    pub idea_id: String,
    pub title: String,
    pub strategic_fit: u8,
    pub market_attractiveness: u8,
    pub technical_feasibility: u8,
    pub priority: Priority,
}

impl IdeaEvaluation {
    /// `fit*w1 + market*w2 + feasibility*w3 + priority*wp`
    pub fn composite_score(&self, weights: &ScoringWeights) -> f64 {
        f64::from(self.strategic_fit) * weights.strategic_fit
            + f64::from(self.market_attractiveness) * weights.market_attractiveness
            + f64::from(self.technical_feasibility) * weights.technical_feasibility
            + f64::from(self.priority.value()) * weights.priority
    }
}

/// One row of the evaluation sheet as filled in by a human
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
    #[serde(default)]
    pub idea_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub application_area: String,
    pub strategic_fit: Option<u8>,
    pub market_attractiveness: Option<u8>,
    pub technical_feasibility: Option<u8>,
    pub priority: Option<String>,
}

impl EvaluationRow {
    /// Blank row for an idea
    pub fn blank(idea: &Idea) -> Self {
        Self {
            idea_id: idea.id.clone(),
            title: idea.title.clone(),
            application_area: idea.application_area.clone(),
            ..Default::default()
        }
    }

    /// Whether the human left every score empty
    pub fn is_unscored(&self) -> bool {
        self.strategic_fit.is_none()
            && self.market_attractiveness.is_none()
            && self.technical_feasibility.is_none()
            && self.priority.as_deref().map_or(true, |p| p.trim().is_empty())
    }

    /// Validate scores (1 to 5) and priority
    pub fn validate(&self) -> Result<IdeaEvaluation, WorkflowError> {
        let label = if self.title.is_empty() {
            self.idea_id.as_str()
        } else {
            self.title.as_str()
        };
        let score = |name: &str, value: Option<u8>| -> Result<u8, WorkflowError> {
            match value {
                Some(v) if (1..=5).contains(&v) => Ok(v),
                Some(v) => Err(WorkflowError::InvalidEvaluation(format!(
                    "'{}': {} must be between 1 and 5, got {}",
                    label, name, v
                ))),
                None => Err(WorkflowError::InvalidEvaluation(format!(
                    "'{}': {} is missing",
                    label, name
                ))),
            }
        };

        let priority = self
            .priority
            .as_deref()
            .ok_or_else(|| {
                WorkflowError::InvalidEvaluation(format!("'{}': priority is missing", label))
            })?
            .parse::<Priority>()
            .map_err(|e| WorkflowError::InvalidEvaluation(format!("'{}': {}", label, e)))?;

        Ok(IdeaEvaluation {
            idea_id: self.idea_id.clone(),
            title: self.title.clone(),
            strategic_fit: score("strategic_fit", self.strategic_fit)?,
            market_attractiveness: score("market_attractiveness", self.market_attractiveness)?,
            technical_feasibility: score("technical_feasibility", self.technical_feasibility)?,
            priority,
        })
    }
}

/// Validate submitted rows. Rows with no scores at all are skipped; a
/// partially filled row is an error. At least one row must be scored.
pub fn validate_rows(rows: &[EvaluationRow]) -> Result<Vec<IdeaEvaluation>, WorkflowError> {
    let evaluations = rows
        .iter()
        .filter(|r| !r.is_unscored())
        .map(EvaluationRow::validate)
        .collect::<Result<Vec<_>, _>>()?;

    if evaluations.is_empty() {
        return Err(WorkflowError::InvalidEvaluation(
            "no idea has been scored".to_string(),
        ));
    }
    Ok(evaluations)
}

/// Evaluation sheet written for the human and read back once scored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSheet {
    pub session_id: String,
    pub company_name: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub ideas: Vec<EvaluationRow>,
}

impl EvaluationSheet {
    pub fn for_ideas(session_id: &str, company_name: &str, ideas: &[Idea]) -> Self {
        Self {
            session_id: session_id.to_string(),
            company_name: company_name.to_string(),
            instructions: "Score strategic_fit, market_attractiveness and technical_feasibility \
                           from 1 to 5 and set priority to High, Medium or Low. Leave a row \
                           blank to exclude the idea."
                .to_string(),
            ideas: ideas.iter().map(EvaluationRow::blank).collect(),
        }
    }

    pub fn to_yaml(&self) -> Result<String, WorkflowError> {
        serde_yaml::to_string(self)
            .map_err(|e| WorkflowError::Artifact(format!("Failed to serialize evaluation sheet: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, WorkflowError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkflowError::Artifact(format!(
                "Failed to read evaluation sheet '{}': {}",
                path.display(),
                e
            ))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            WorkflowError::InvalidEvaluation(format!(
                "Failed to parse evaluation sheet '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

/// An idea with its evaluation and composite score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedIdea {
    pub idea: Idea,
    pub evaluation: IdeaEvaluation,
    pub score: f64,
}

/// Keep the `k` highest-scoring items, highest first. Equal scores keep
/// their input order (first seen wins).
pub fn select_top<T>(scored: Vec<(T, f64)>, k: usize) -> Vec<(T, f64)> {
    let mut indexed: Vec<(usize, T, f64)> = scored
        .into_iter()
        .enumerate()
        .map(|(i, (item, score))| (i, item, score))
        .collect();

    indexed.sort_by(|a, b| match b.2.total_cmp(&a.2) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });

    indexed
        .into_iter()
        .take(k)
        .map(|(_, item, score)| (item, score))
        .collect()
}

/// Match evaluations to ideas (by id, then by title), score and keep the top `k`
pub fn rank_ideas(
    ideas: &[Idea],
    evaluations: &[IdeaEvaluation],
    weights: &ScoringWeights,
    k: usize,
) -> Vec<RankedIdea> {
    let mut scored = Vec::new();
    for evaluation in evaluations {
        let matched = ideas
            .iter()
            .find(|i| !evaluation.idea_id.is_empty() && i.id == evaluation.idea_id)
            .or_else(|| {
                ideas.iter().find(|i| {
                    i.title.trim().eq_ignore_ascii_case(evaluation.title.trim())
                })
            });

        match matched {
            Some(idea) => {
                let score = evaluation.composite_score(weights);
                scored.push((
                    RankedIdea {
                        idea: idea.clone(),
                        evaluation: evaluation.clone(),
                        score,
                    },
                    score,
                ));
            }
            None => log::warn!(
                "Evaluation for '{}' does not match any generated idea, ignoring",
                evaluation.title
            ),
        }
    }

    select_top(scored, k)
        .into_iter()
        .map(|(ranked, _)| ranked)
        .collect()
}
