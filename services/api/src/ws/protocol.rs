//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! The client never sends JSON: after an `input_request` it replies with the
//! raw text of its turn.

use debate_core::{DebateEvent, graph::Node, state::Side};
use serde::Serialize;

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A node of the debate started executing.
    Node { node: Node },
    /// The latest full script of the current speaker.
    Message {
        node: Node,
        content: String,
        is_final: bool,
    },
    /// The server waits for the human's turn.
    InputRequest { node: Node },
    /// The debate ended normally.
    Status { content: String },
    /// The session is invalid or a turn failed.
    Error { content: String },
}

impl ServerMessage {
    pub fn concluded(winner: Option<Side>) -> Self {
        let content = match winner {
            Some(side) => format!("The debate has ended. Winner: {side}"),
            None => "The debate has ended.".to_string(),
        };
        ServerMessage::Status { content }
    }

    pub fn error(content: impl Into<String>) -> Self {
        ServerMessage::Error {
            content: content.into(),
        }
    }
}

impl From<DebateEvent> for ServerMessage {
    fn from(event: DebateEvent) -> Self {
        match event {
            DebateEvent::NodeEntered(node) => ServerMessage::Node { node },
            DebateEvent::Message {
                node,
                content,
                is_final,
            } => ServerMessage::Message {
                node,
                content,
                is_final,
            },
            DebateEvent::InputRequested => ServerMessage::InputRequest { node: Node::Human },
            DebateEvent::Concluded { winner } => ServerMessage::concluded(winner),
        }
    }
}
