//! Checkpointing workflow engine
//!
//! `run` walks the graph in order against the stored session. Stages whose
//! checkpoint predicate already holds are skipped, stages requested for
//! re-run are executed again, and execution stops before the first stage
//! named in `pause_before`. The state is stored after every executed stage,
//! so a failing stage leaves the session at its last merged value.

use super::graph::{StageName, WorkflowGraph};
use super::state::SessionState;
use super::store::SessionStore;
use crate::error::{WorkflowError, WorkflowResult};
use crate::stages::{standard_stages, Replay, StageContext, StageHandler};
use crate::utils::lock_mutex_recover;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// Per-call execution options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop before the first of these stages; each must be a declared pause point
    pub pause_before: BTreeSet<StageName>,
    /// Execute these stages, and every stage after them, even if satisfied
    pub rerun: BTreeSet<StageName>,
}

impl RunOptions {
    pub fn pause_before(stages: &[StageName]) -> Self {
        Self {
            pause_before: stages.iter().copied().collect(),
            rerun: BTreeSet::new(),
        }
    }

    pub fn to_completion() -> Self {
        Self::default()
    }

    pub fn with_rerun(mut self, stage: StageName) -> Self {
        self.rerun.insert(stage);
        self
    }

    /// Index from which satisfied stages are executed anyway
    fn force_from(&self) -> Option<usize> {
        self.rerun.iter().map(StageName::index).min()
    }
}

/// Why a run returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stopped before a pause point; that stage has not executed
    Paused { before: StageName },
    /// Every stage is done
    Completed,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: SessionState,
    pub outcome: RunOutcome,
    /// Stages executed during this run, in order
    pub executed: Vec<StageName>,
    /// Stages skipped because their checkpoint was satisfied
    pub skipped: Vec<StageName>,
}

impl RunReport {
    pub fn is_paused(&self) -> bool {
        matches!(self.outcome, RunOutcome::Paused { .. })
    }
}

pub struct WorkflowEngine {
    graph: WorkflowGraph,
    handlers: HashMap<StageName, Arc<dyn StageHandler>>,
    store: Arc<dyn SessionStore>,
    context: StageContext,
    /// One async lock per session id
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn SessionStore>, context: StageContext) -> Self {
        let handlers = standard_stages()
            .into_iter()
            .map(|handler| (handler.name(), handler))
            .collect();
        Self {
            graph: WorkflowGraph::standard(),
            handlers,
            store,
            context,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the handler for one stage
    pub fn with_handler(mut self, handler: Arc<dyn StageHandler>) -> Self {
        self.handlers.insert(handler.name(), handler);
        self
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn context(&self) -> &StageContext {
        &self.context
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock_mutex_recover(&self.locks)
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn handler(&self, stage: StageName) -> WorkflowResult<&Arc<dyn StageHandler>> {
        self.handlers
            .get(&stage)
            .ok_or_else(|| WorkflowError::Configuration(format!("No handler registered for stage '{}'", stage)))
    }

    /// Create and store a new session
    pub async fn create_session(&self, company_name: &str) -> WorkflowResult<SessionState> {
        let company_name = company_name.trim();
        if company_name.is_empty() {
            return Err(WorkflowError::precondition(StageName::Search, "company_name"));
        }
        let state = SessionState::new(company_name);
        self.store.put(state.clone()).await?;
        log::info!("[{}] Session created for '{}'", state.session_id, company_name);
        Ok(state)
    }

    pub async fn get(&self, session_id: &str) -> WorkflowResult<SessionState> {
        self.store.get(session_id).await
    }

    pub async fn delete(&self, session_id: &str) -> WorkflowResult<bool> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;
        let existed = self.store.delete(session_id).await?;
        lock_mutex_recover(&self.locks).remove(session_id);
        Ok(existed)
    }

    /// Apply caller input to a stored session under the session lock
    pub async fn update<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionState) -> WorkflowResult<T> + Send,
    ) -> WorkflowResult<T> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;
        let mut state = self.store.get(session_id).await?;
        let result = f(&mut state)?;
        self.store.put(state).await?;
        Ok(result)
    }

    /// Run the graph, stopping before the first of `pause_before`
    pub async fn run(&self, session_id: &str, pause_before: &[StageName]) -> WorkflowResult<RunReport> {
        self.run_with(session_id, RunOptions::pause_before(pause_before)).await
    }

    pub async fn run_with(&self, session_id: &str, options: RunOptions) -> WorkflowResult<RunReport> {
        self.graph.validate_pause_before(&options.pause_before)?;

        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut state = self.store.get(session_id).await?;
        let force_from = options.force_from();
        let mut executed = Vec::new();
        let mut skipped = Vec::new();

        for &stage in self.graph.stages() {
            if options.pause_before.contains(&stage) {
                log::info!("[{}] Paused before '{}'", session_id, stage);
                self.store.put(state.clone()).await?;
                return Ok(RunReport {
                    state,
                    outcome: RunOutcome::Paused { before: stage },
                    executed,
                    skipped,
                });
            }

            let handler = self.handler(stage)?;
            let forced = force_from.map_or(false, |from| stage.index() >= from);
            if !forced && handler.is_satisfied(&state) {
                log::debug!("[{}] '{}' checkpoint satisfied, skipping", session_id, stage);
                state.advance_past(stage)?;
                skipped.push(stage);
                continue;
            }

            let runs = state.runs_of(stage);
            if runs > 0 {
                match handler.replay() {
                    Replay::Idempotent => {
                        log::debug!("[{}] Re-running idempotent stage '{}'", session_id, stage)
                    }
                    Replay::LastWriteWins => log::info!(
                        "[{}] Re-running '{}' (run {}), previous output is replaced",
                        session_id,
                        stage,
                        runs + 1
                    ),
                }
            }

            log::info!("[{}] Executing '{}'", session_id, stage);
            let patch = handler.execute(&state, &self.context).await.map_err(|e| {
                log::error!("[{}] Stage '{}' failed: {}", session_id, stage, e);
                e
            })?;

            let fields = patch.touched_fields();
            state.apply(patch);
            state.record_checkpoint(stage, fields)?;
            self.store.put(state.clone()).await?;
            executed.push(stage);
        }

        self.store.put(state.clone()).await?;
        log::info!("[{}] Workflow completed", session_id);
        Ok(RunReport {
            state,
            outcome: RunOutcome::Completed,
            executed,
            skipped,
        })
    }
}
