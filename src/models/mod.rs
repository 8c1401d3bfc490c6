// Domain records produced and consumed by the workflow stages

use serde::{Deserialize, Serialize};

/// Closed technology-level taxonomy for competencies
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TechnologyLevel {
    Basic,
    Intermediate,
    Advanced,
    #[serde(rename = "Cutting-edge")]
    CuttingEdge,
}

impl TechnologyLevel {
    /// All levels, lowest first
    pub fn all() -> &'static [TechnologyLevel] {
        &[
            TechnologyLevel::Basic,
            TechnologyLevel::Intermediate,
            TechnologyLevel::Advanced,
            TechnologyLevel::CuttingEdge,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TechnologyLevel::Basic => "Basic",
            TechnologyLevel::Intermediate => "Intermediate",
            TechnologyLevel::Advanced => "Advanced",
            TechnologyLevel::CuttingEdge => "Cutting-edge",
        }
    }
}

impl std::fmt::Display for TechnologyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TechnologyLevel {
    type Err = String;

    /// Strict parse of the canonical labels (case-insensitive).
    /// Free text goes through `extraction::normalize_level` instead.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TechnologyLevel::all()
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                format!(
                    "Unknown technology level: '{}'. Expected one of: Basic, Intermediate, Advanced, Cutting-edge",
                    s
                )
            })
    }
}

/// A search hit about the company
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snippet {
    pub url: String,
    pub text: String,
}

impl Snippet {
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
        }
    }
}

/// A discovered company competency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Competency {
    pub id: String,
    pub session_id: String,
    pub category: String,
    pub competency: String,
    pub description: String,
    pub technology_level: TechnologyLevel,
    #[serde(default)]
    pub source_url: String,
}

impl Competency {
    /// Create a competency with a fresh identifier
    pub fn new(
        session_id: &str,
        category: impl Into<String>,
        competency: impl Into<String>,
        description: impl Into<String>,
        technology_level: TechnologyLevel,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            category: category.into(),
            competency: competency.into(),
            description: description.into(),
            technology_level,
            source_url: String::new(),
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }

    /// Text used for similarity indexing
    pub fn index_text(&self) -> String {
        format!("{} - {}", self.competency, self.description)
    }
}

/// A competency as reviewed by a human, with a free-text level
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompetencyRow {
    #[serde(default, alias = "Category")]
    pub category: String,
    #[serde(alias = "Competency")]
    pub competency: String,
    #[serde(default, alias = "Description")]
    pub description: String,
    #[serde(default, alias = "Technology Level")]
    pub technology_level: String,
    #[serde(default, alias = "Source URL")]
    pub source_url: String,
}

impl CompetencyRow {
    pub fn new(category: &str, competency: &str, technology_level: &str) -> Self {
        Self {
            category: category.to_string(),
            competency: competency.to_string(),
            technology_level: technology_level.to_string(),
            ..Default::default()
        }
    }
}

impl From<&Competency> for CompetencyRow {
    fn from(c: &Competency) -> Self {
        Self {
            category: c.category.clone(),
            competency: c.competency.clone(),
            description: c.description.clone(),
            technology_level: c.technology_level.to_string(),
            source_url: c.source_url.clone(),
        }
    }
}

/// A generated innovation idea
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Idea {
    pub id: String,
    pub session_id: String,
    pub title: String,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub application_area: String,
    #[serde(default)]
    pub strategic_rationale: String,
    #[serde(default)]
    pub example_analogs: Vec<String>,
    /// Ids of the competencies most similar to this idea
    #[serde(default)]
    pub related_competencies: Vec<String>,
}

impl Idea {
    pub fn new(session_id: &str, title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            title: title.into(),
            components: Vec::new(),
            application_area: String::new(),
            strategic_rationale: String::new(),
            example_analogs: Vec::new(),
            related_competencies: Vec::new(),
        }
    }
}

/// Answer supplied by a human to a gap question. An empty answer means "skipped".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Clarification {
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

impl Clarification {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.answer.trim().is_empty()
    }
}
