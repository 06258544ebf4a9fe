//! Error taxonomy for debate sessions.

use thiserror::Error;

/// Failures surfaced by the debate orchestrator and state machine.
///
/// Collaborators (the language model client and the session store) report
/// `anyhow` errors; those are wrapped into [`DebateError::Capability`] and
/// [`DebateError::Store`] at the boundary.
#[derive(Debug, Error)]
pub enum DebateError {
    /// The session id is unknown, expired, or has no topic.
    #[error("invalid or expired session: {0}")]
    InvalidSession(String),
    /// Another `resume` for this session is still running.
    #[error("session {0} already has a debate turn in progress")]
    SessionBusy(String),
    /// Human input arrived while the session was not suspended at the human turn.
    #[error("session {0} is not awaiting human input")]
    NotAwaitingInput(String),
    /// The language model produced output that breaks the turn contract.
    #[error("capability contract violation: {0}")]
    ContractViolation(String),
    /// The language model call itself failed.
    #[error("language model call failed: {0:#}")]
    Capability(#[source] anyhow::Error),
    /// Loading or saving session state failed.
    #[error("session store failure: {0:#}")]
    Store(#[source] anyhow::Error),
}

pub type Result<T, E = DebateError> = std::result::Result<T, E>;
