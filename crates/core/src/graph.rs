//! Debate State Machine
//!
//! The debate is a four-node graph: the moderator hands the floor to the AI
//! debater, the human or the judge; debater and human always hand it back to
//! the moderator; the judge ends the debate. The edges are plain data and the
//! transition function is pure, so the orchestrator only has to apply outputs
//! and follow [`position`].

use crate::error::{DebateError, Result};
use crate::state::{
    ChatMessage, DebateState, DebaterOutput, JudgeOutput, ModeratorOutput, Role, Side,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node of the debate graph.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    Moderator,
    Debater,
    Human,
    Judge,
}

impl Node {
    pub fn as_str(self) -> &'static str {
        match self {
            Node::Moderator => "moderator",
            Node::Debater => "debater",
            Node::Human => "human",
            Node::Judge => "judge",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The routing key computed when leaving a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Unconditional edge.
    Always,
    ToDebater,
    ToHuman,
    ToJudge,
}

/// `(from, key, to)` triples. The judge has no outgoing edge.
const EDGES: [(Node, Edge, Node); 5] = [
    (Node::Moderator, Edge::ToDebater, Node::Debater),
    (Node::Moderator, Edge::ToHuman, Node::Human),
    (Node::Moderator, Edge::ToJudge, Node::Judge),
    (Node::Debater, Edge::Always, Node::Moderator),
    (Node::Human, Edge::Always, Node::Moderator),
];

/// The node every new debate starts in.
pub const START: Node = Node::Moderator;

/// Looks up the target of `edge` leaving `from`.
pub fn transition(from: Node, edge: Edge) -> Option<Node> {
    EDGES
        .iter()
        .find(|(source, key, _)| *source == from && *key == edge)
        .map(|(_, _, target)| *target)
}

/// Routing rule applied to the moderator's chosen `next_speaker`.
///
/// The judge ends the debate, the human's own side suspends for input and the
/// other side goes to the AI debater. A moderator that names itself breaks the
/// capability contract.
pub fn route(next_speaker: Role, user_side: Side) -> Result<Edge> {
    match next_speaker {
        Role::Judge => Ok(Edge::ToJudge),
        Role::Moderator => Err(DebateError::ContractViolation(
            "moderator named itself as the next speaker".to_string(),
        )),
        side if side.side() == Some(user_side) => Ok(Edge::ToHuman),
        _ => Ok(Edge::ToDebater),
    }
}

/// The node the debate is positioned at, or `None` once it has concluded.
pub fn position(state: &DebateState) -> Result<Option<Node>> {
    if state.is_concluded() {
        return Ok(None);
    }
    match state.next_speaker {
        None | Some(Role::Moderator) => Ok(Some(START)),
        Some(speaker) => {
            let edge = route(speaker, state.user_side)?;
            Ok(transition(Node::Moderator, edge))
        }
    }
}

/// Applies a moderator turn. Validates the hand-off before touching `state`,
/// so a rejected turn leaves it unchanged.
pub fn apply_moderator(state: &mut DebateState, output: ModeratorOutput) -> Result<Node> {
    let edge = route(output.next_speaker, state.user_side)?;
    let next = transition(Node::Moderator, edge).ok_or_else(|| {
        DebateError::ContractViolation(format!("no edge from moderator for {edge:?}"))
    })?;
    state
        .messages
        .push(ChatMessage::new(Role::Moderator, output.script));
    state.next_speaker = Some(output.next_speaker);
    Ok(next)
}

/// Applies an AI debater turn; the debater always argues the side opposite the human.
pub fn apply_debater(state: &mut DebateState, output: DebaterOutput) -> Node {
    let role = state.ai_side().as_role();
    state.messages.push(ChatMessage::new(role, output.script));
    state.next_speaker = Some(Role::Moderator);
    Node::Moderator
}

/// Applies the human's externally supplied turn.
pub fn apply_human(state: &mut DebateState, text: impl Into<String>) -> Node {
    let role = state.user_side.as_role();
    state.messages.push(ChatMessage::new(role, text));
    state.next_speaker = Some(Role::Moderator);
    Node::Moderator
}

/// Applies the judgment. The debate is terminal afterwards.
pub fn apply_judge(state: &mut DebateState, output: JudgeOutput) {
    state.messages.push(ChatMessage::new(Role::Judge, output.script));
    state.winner = Some(output.winner);
    state.next_speaker = None;
}
