//! API Models
//!
//! Request and response bodies of the REST API, with `utoipa` schemas for the
//! OpenAPI document. Core types are exposed as plain strings in the schema.

use chrono::{DateTime, Utc};
use debate_core::{
    graph::{self, Node},
    state::{ChatMessage, DebateState, Role, Side},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateDebatePayload {
    #[schema(example = "Remote work is better than office work")]
    pub topic: String,
    /// The side argued by the human participant.
    #[serde(alias = "user_side")]
    #[schema(value_type = String, example = "negative")]
    pub user_side: Side,
    /// Reuses (and resets) an existing session id when given.
    #[serde(default, alias = "session_id")]
    pub session_id: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateDebateResponse {
    pub session_id: String,
}

/// Where a session currently stands.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    InProgress,
    AwaitingInput,
    Concluded,
}

impl DebateStatus {
    pub fn of(state: &DebateState) -> Self {
        match graph::position(state) {
            Ok(None) => DebateStatus::Concluded,
            Ok(Some(Node::Human)) => DebateStatus::AwaitingInput,
            // A stored state that cannot be routed still has turns to run.
            Ok(Some(_)) | Err(_) => DebateStatus::InProgress,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct MessageView {
    #[schema(value_type = String, example = "moderator")]
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<ChatMessage> for MessageView {
    fn from(message: ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content,
            timestamp: message.timestamp,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DebateView {
    pub session_id: String,
    pub topic: String,
    #[schema(value_type = String, example = "negative")]
    pub user_side: Side,
    #[schema(value_type = Option<String>, example = "positive")]
    pub next_speaker: Option<Role>,
    pub status: DebateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub winner: Option<Side>,
    pub messages: Vec<MessageView>,
}

impl DebateView {
    pub fn new(session_id: String, state: DebateState) -> Self {
        let status = DebateStatus::of(&state);
        Self {
            session_id,
            topic: state.topic,
            user_side: state.user_side,
            next_speaker: state.next_speaker,
            status,
            winner: state.winner,
            messages: state.messages.into_iter().map(MessageView::from).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
