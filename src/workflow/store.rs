//! Session state store behind a narrow interface

use super::state::SessionState;
use crate::error::WorkflowError;
use crate::utils::lock_mutex_recover;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Keyed store of session states; the engine's only persistence
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session, failing with `NotFound` for unknown ids
    async fn get(&self, session_id: &str) -> Result<SessionState, WorkflowError>;

    /// Insert or replace a session
    async fn put(&self, state: SessionState) -> Result<(), WorkflowError>;

    /// Remove a session, returning whether it existed
    async fn delete(&self, session_id: &str) -> Result<bool, WorkflowError>;

    /// Ids of all stored sessions
    async fn list(&self) -> Result<Vec<String>, WorkflowError>;
}

/// Process-local session store
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<SessionState, WorkflowError> {
        lock_mutex_recover(&self.sessions)
            .get(session_id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(session_id.to_string()))
    }

    async fn put(&self, state: SessionState) -> Result<(), WorkflowError> {
        lock_mutex_recover(&self.sessions).insert(state.session_id.clone(), state);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, WorkflowError> {
        Ok(lock_mutex_recover(&self.sessions).remove(session_id).is_some())
    }

    async fn list(&self) -> Result<Vec<String>, WorkflowError> {
        let mut ids: Vec<String> = lock_mutex_recover(&self.sessions).keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
