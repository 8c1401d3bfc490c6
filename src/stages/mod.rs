//! Workflow stages
//!
//! Each stage reads the session state, talks to its collaborators and
//! returns a [`StatePatch`]. The engine merges the patch; stages never write
//! the session state themselves. Record persistence is the stage's own
//! concern and must tolerate replay.

pub mod action_plan;
pub mod extract;
pub mod gaps;
pub mod ideas;
pub mod search;
pub mod select;
pub mod template;

use crate::collaborators::SearchProvider;
use crate::config::AppConfig;
use crate::error::WorkflowError;
use crate::extraction::StructuredExtractor;
use crate::prompts::PromptLibrary;
use crate::ranking::ScoringWeights;
use crate::records::{RecordStore, SimilarityIndex};
use crate::workflow::{SessionState, StageName, StatePatch};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub use action_plan::{ActionPlanStage, PLAN_FAILED_PLACEHOLDER};
pub use extract::ExtractStage;
pub use gaps::ResolveGapsStage;
pub use ideas::GenerateIdeasStage;
pub use search::SearchStage;
pub use select::SelectIdeasStage;
pub use template::TemplateStage;

/// How a stage behaves when executed again for the same session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Replay {
    /// Same input produces the same output and side effects
    Idempotent,
    /// Output and persisted records are replaced by the latest execution
    LastWriteWins,
}

/// Tunables the stages read from configuration
#[derive(Debug, Clone)]
pub struct StageSettings {
    pub artifacts_dir: PathBuf,
    pub max_results: usize,
    pub max_ideas: usize,
    pub top_k: usize,
    pub enrich_analogs: bool,
    pub related_competencies: usize,
    pub weights: ScoringWeights,
}

impl StageSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            artifacts_dir: config.workflow.artifacts_dir.clone(),
            max_results: config.search.max_results,
            max_ideas: config.workflow.max_ideas,
            top_k: config.workflow.top_k,
            enrich_analogs: config.workflow.enrich_analogs,
            related_competencies: config.workflow.related_competencies,
            weights: config.ranking,
        }
    }
}

impl Default for StageSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Collaborators shared by all stages
#[derive(Clone)]
pub struct StageContext {
    pub extractor: StructuredExtractor,
    pub search: Arc<dyn SearchProvider>,
    pub prompts: Arc<PromptLibrary>,
    pub records: Arc<dyn RecordStore>,
    pub index: Arc<dyn SimilarityIndex>,
    pub settings: StageSettings,
}

impl StageContext {
    /// Render a prompt template with the given variables
    pub fn render(&self, name: &str, context: &tera::Context) -> Result<String, WorkflowError> {
        self.prompts.render(name, context)
    }
}

/// One node of the workflow graph
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn name(&self) -> StageName;

    fn replay(&self) -> Replay;

    /// Checkpoint predicate: the stage's output is present and current
    fn is_satisfied(&self, state: &SessionState) -> bool;

    /// Produce the stage's patch. A failing stage contributes nothing.
    async fn execute(
        &self,
        state: &SessionState,
        ctx: &StageContext,
    ) -> Result<StatePatch, WorkflowError>;
}

/// Handlers for every stage of the standard graph, in order
pub fn standard_stages() -> Vec<Arc<dyn StageHandler>> {
    vec![
        Arc::new(SearchStage),
        Arc::new(ExtractStage),
        Arc::new(ResolveGapsStage),
        Arc::new(GenerateIdeasStage),
        Arc::new(TemplateStage),
        Arc::new(SelectIdeasStage),
        Arc::new(ActionPlanStage),
    ]
}
