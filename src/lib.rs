// Clippy allows for reasonable defaults
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::field_reassign_with_default)] // Builder pattern is clearer
#![allow(clippy::unnecessary_map_or)] // map_or can be clearer than alternatives
#![allow(clippy::redundant_closure)] // |x| f(x) can be clearer than f

// Module declarations
pub mod collaborators;
pub mod config;
pub mod error;
pub mod extraction;
pub mod models;
pub mod prompts;
pub mod ranking;
pub mod records;
pub mod stages;
pub mod utils;
pub mod workflow;

pub use error::{GenerationError, SearchError, StoreError, WorkflowError, WorkflowResult};
pub use models::*;
pub use workflow::{
    ClarificationRound, LoopStatus, RunOptions, RunOutcome, RunReport, SessionManager,
    SessionState, StageCursor, StageName, WorkflowEngine,
};

use collaborators::{
    GeminiClient, ResilientSearch, ScriptedGenerator, SearchProvider, StaticSearch, TavilyClient,
    TextGenerator,
};
use config::{resolve_secret, AppConfig, SecretsConfig, GEMINI_API_KEY, TAVILY_API_KEY};
use extraction::StructuredExtractor;
use prompts::PromptLibrary;
use records::{JsonFileRecordStore, ResilientIndex};
use stages::{StageContext, StageSettings};
use std::sync::Arc;
use workflow::InMemorySessionStore;

/// Build a session manager from configuration.
///
/// `offline` swaps both collaborators for deterministic in-process ones;
/// records are still written under `<artifacts>/records`.
pub fn build_session_manager(config: &AppConfig, offline: bool) -> Result<SessionManager, WorkflowError> {
    let prompts = Arc::new(PromptLibrary::load(config.workflow.prompts_dir.as_deref())?);

    let generator: Arc<dyn TextGenerator>;
    let primary_search: Arc<dyn SearchProvider>;
    if offline {
        log::info!("Offline mode: using scripted collaborators");
        generator = Arc::new(ScriptedGenerator::offline());
        primary_search = Arc::new(StaticSearch::empty());
    } else {
        let secrets = SecretsConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load secrets file: {}", e);
            SecretsConfig::default()
        });
        let gemini_key = resolve_secret(GEMINI_API_KEY, &secrets);
        if gemini_key.is_none() {
            return Err(WorkflowError::Configuration(format!(
                "{} is not set. Export it or add it to the secrets file, or use --offline.",
                GEMINI_API_KEY
            )));
        }
        generator = Arc::new(GeminiClient::new(gemini_key, &config.generation));
        // A missing search key degrades to generator-synthesized snippets
        primary_search = Arc::new(TavilyClient::new(
            resolve_secret(TAVILY_API_KEY, &secrets),
            &config.search,
        ));
    }

    let extractor = StructuredExtractor::new(generator, prompts.clone());
    let search = ResilientSearch::new(Some(primary_search), Some(extractor.clone()), prompts.clone());
    let records = JsonFileRecordStore::new(config.workflow.artifacts_dir.join("records"))?;

    let context = StageContext {
        extractor,
        search: Arc::new(search),
        prompts,
        records: Arc::new(records),
        index: Arc::new(ResilientIndex::in_memory()),
        settings: StageSettings::from_config(config),
    };
    let engine = WorkflowEngine::new(Arc::new(InMemorySessionStore::new()), context);
    Ok(SessionManager::new(Arc::new(engine)))
}
