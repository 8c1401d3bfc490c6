//! Workflow Module - resumable innovation workflow
//!
//! ## Stages
//!
//! 1. **search** - Web snippets about the company
//! 2. **extract** - Competencies, normalized to the closed level taxonomy
//! 3. **resolve_gaps** - Clarification loop with a human
//! 4. **generate_ideas** - Ideas built on the validated competencies
//! 5. **generate_template** - Evaluation sheet for human scoring
//! 6. **select_ideas** - Weighted ranking, top-k
//! 7. **generate_action_plans** - Markdown plan per selected idea
//!
//! Execution may pause before `generate_ideas` (waiting for clarifications)
//! and before `select_ideas` (waiting for scores). Progress is tracked by an
//! explicit [`StageCursor`] and per-stage checkpoints, so resuming a session
//! only executes stages that are still pending.

pub mod engine;
pub mod graph;
pub mod session;
pub mod state;
pub mod store;

#[cfg(test)]
mod tests;

pub use engine::{RunOptions, RunOutcome, RunReport, WorkflowEngine};
pub use graph::{StageName, WorkflowGraph};
pub use session::{ClarificationRound, Completion, IdeasReady, LoopStatus, SessionManager};
pub use state::{
    can_transition, is_completion_token, transition_cursor, valid_next_cursors, Checkpoint,
    SessionState, StageCursor, StatePatch, COMPLETION_TOKEN,
};
pub use store::{InMemorySessionStore, SessionStore};
