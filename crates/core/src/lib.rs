//! Debate Core
//!
//! A turn-based debate between an AI moderator, an AI debater, an AI judge and
//! one human participant. The state machine lives in [`graph`], streamed
//! structured output is revealed by [`partial_json`], and [`session`] drives
//! sessions to their next suspend point while persisting through [`store`].

pub mod agents;
pub mod error;
pub mod graph;
pub mod llm_client;
pub mod partial_json;
pub mod session;
pub mod state;
pub mod store;

pub use error::{DebateError, Result};
pub use session::{DebateEvent, EventStream, SessionRegistry};
