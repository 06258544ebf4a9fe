//! Session Store
//!
//! Persistence contract for per-session [`DebateState`]. Each call must be
//! atomic for its session id; the orchestrator serializes read-modify-write
//! cycles on top of that.

use crate::state::DebateState;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Defines the contract for any backend that persists debate state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the state of `session_id`, or `None` if it was never saved.
    async fn load_state(&self, session_id: &str) -> Result<Option<DebateState>>;

    /// Replaces the stored state of `session_id`.
    async fn save_state(&self, session_id: &str, state: &DebateState) -> Result<()>;
}

/// A process-local `SessionStore`, for tests and single-process deployments
/// that do not need state to survive a restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    states: RwLock<HashMap<String, DebateState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load_state(&self, session_id: &str) -> Result<Option<DebateState>> {
        Ok(self.states.read().await.get(session_id).cloned())
    }

    async fn save_state(&self, session_id: &str, state: &DebateState) -> Result<()> {
        self.states
            .write()
            .await
            .insert(session_id.to_string(), state.clone());
        Ok(())
    }
}
