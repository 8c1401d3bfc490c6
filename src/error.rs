// Error taxonomy for the workflow engine and its collaborators

use crate::workflow::{StageCursor, StageName};
use thiserror::Error;

/// Failure of the search collaborator, after its own retry policy
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search provider is not configured: {0}")]
    NotConfigured(String),

    #[error("Search provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Search request failed: {0}")]
    Transport(String),

    #[error("Failed to decode search response: {0}")]
    Decode(String),
}

impl SearchError {
    /// Whether the failure is worth another attempt (5xx, 429, timeouts)
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::Http { status, .. } => is_retryable_status(*status),
            SearchError::Transport(_) => true,
            SearchError::NotConfigured(_) | SearchError::Decode(_) => false,
        }
    }
}

/// HTTP statuses that the search retry policy treats as transient
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

/// Failure of the text-generation collaborator
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Text generation is not configured. {guidance}")]
    NotConfigured { guidance: String },

    #[error("Text generation API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Text generation call failed: {0}")]
    Transport(String),

    #[error("Text generation returned no text")]
    EmptyResponse,

    #[error("No scripted response left for prompt: {0}")]
    Exhausted(String),
}

/// Failure of the structured record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record store I/O failed: {0}")]
    Io(String),

    #[error("Record could not be (de)serialized: {0}")]
    Serde(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serde(err.to_string())
    }
}

/// Errors surfaced to callers of the workflow engine
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Stage '{stage}' cannot run: missing {missing}")]
    Precondition { stage: StageName, missing: String },

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Invalid cursor transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: Option<StageCursor>,
        to: StageCursor,
    },

    #[error("'{0}' is not a declared pause point")]
    InvalidPausePoint(StageName),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Invalid evaluation: {0}")]
    InvalidEvaluation(String),
}

impl WorkflowError {
    pub fn precondition(stage: StageName, missing: impl Into<String>) -> Self {
        WorkflowError::Precondition {
            stage,
            missing: missing.into(),
        }
    }

    /// Missing credentials or configuration; not retried
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            WorkflowError::Configuration(_)
                | WorkflowError::Search(SearchError::NotConfigured(_))
                | WorkflowError::Generation(GenerationError::NotConfigured { .. })
        )
    }

    /// A collaborator failed after exhausting its own retry policy
    pub fn is_collaborator(&self) -> bool {
        match self {
            WorkflowError::Search(e) => !matches!(e, SearchError::NotConfigured(_)),
            WorkflowError::Generation(e) => !matches!(e, GenerationError::NotConfigured { .. }),
            _ => false,
        }
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, WorkflowError::Precondition { .. })
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
