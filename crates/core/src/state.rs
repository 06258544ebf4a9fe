//! Debate State
//!
//! The persisted per-session state and the structured outputs produced by the
//! moderator, debater and judge agents.

use chrono::{DateTime, Utc};
use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One side of the motion.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Positive,
    Negative,
}

impl Side {
    /// The side argued against this one.
    pub fn opposite(self) -> Self {
        match self {
            Side::Positive => Side::Negative,
            Side::Negative => Side::Positive,
        }
    }

    pub fn as_role(self) -> Role {
        match self {
            Side::Positive => Role::Positive,
            Side::Negative => Role::Negative,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_role().fmt(f)
    }
}

/// Identity tag of a debate participant.
///
/// Used both to label appended messages and as the `next_speaker` routing key.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Moderator,
    Positive,
    Negative,
    Judge,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Moderator => "moderator",
            Role::Positive => "positive",
            Role::Negative => "negative",
            Role::Judge => "judge",
        }
    }

    /// Returns the debating side for `positive`/`negative`, `None` otherwise.
    pub fn side(self) -> Option<Side> {
        match self {
            Role::Positive => Some(Side::Positive),
            Role::Negative => Some(Side::Negative),
            Role::Moderator | Role::Judge => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single utterance in the debate history. Never modified once appended.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The complete persisted state of one debate session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DebateState {
    /// The motion under debate. Fixed at creation.
    pub topic: String,
    /// The side argued by the human participant. Fixed at creation.
    pub user_side: Side,
    /// Chronological, append-only history.
    pub messages: Vec<ChatMessage>,
    /// Whose turn is next; `None` once the judge has spoken.
    pub next_speaker: Option<Role>,
    /// The judge's verdict, set together with the judgment message.
    #[serde(default)]
    pub winner: Option<Side>,
}

impl DebateState {
    /// Creates the initial state: moderator to speak, empty history.
    pub fn new(topic: impl Into<String>, user_side: Side) -> Self {
        Self {
            topic: topic.into(),
            user_side,
            messages: Vec::new(),
            next_speaker: Some(Role::Moderator),
            winner: None,
        }
    }

    /// A state is usable as a session only when it carries a topic.
    pub fn has_topic(&self) -> bool {
        !self.topic.trim().is_empty()
    }

    /// True once a judgment has been appended; no further transitions occur.
    pub fn is_concluded(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::Judge)
    }

    /// The side played by the AI debater.
    pub fn ai_side(&self) -> Side {
        self.user_side.opposite()
    }
}

/// Output schema of the moderator agent.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModeratorOutput {
    /// The moderator's remark.
    pub script: String,
    /// Who speaks next: `positive`, `negative` or `judge`.
    #[schemars(schema_with = "handoff_schema")]
    pub next_speaker: Role,
}

/// Moderators may only hand off to the three other roles.
fn handoff_schema(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "string",
        "enum": ["positive", "negative", "judge"]
    })
}

/// Output schema of the AI debater agent.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DebaterOutput {
    /// The debater's statement.
    pub script: String,
}

/// Output schema of the judge agent.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct JudgeOutput {
    /// The judge's closing verdict.
    pub script: String,
    /// The winning side.
    pub winner: Side,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_starts_with_moderator() {
        let state = DebateState::new("Remote work beats office work", Side::Negative);
        assert_eq!(state.next_speaker, Some(Role::Moderator));
        assert!(state.messages.is_empty());
        assert!(state.has_topic());
        assert!(!state.is_concluded());
        assert_eq!(state.ai_side(), Side::Positive);
    }

    #[test]
    fn test_blank_topic_is_not_a_session() {
        assert!(!DebateState::new("   ", Side::Positive).has_topic());
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Judge).unwrap(), "\"judge\"");
        let role: Role = serde_json::from_str("\"negative\"").unwrap();
        assert_eq!(role, Role::Negative);
        assert_eq!(role.side(), Some(Side::Negative));
        assert_eq!(Role::Moderator.side(), None);
    }

    #[test]
    fn test_moderator_output_rejects_unknown_speaker() {
        let result: Result<ModeratorOutput, _> =
            serde_json::from_str(r#"{"script":"Next!","next_speaker":"audience"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_judge_output_parses_winner() {
        let out: JudgeOutput =
            serde_json::from_str(r#"{"script":"Well argued.","winner":"positive"}"#).unwrap();
        assert_eq!(out.winner, Side::Positive);
    }

    #[test]
    fn test_moderator_schema_only_offers_handoff_roles() {
        let schema = serde_json::to_value(schemars::schema_for!(ModeratorOutput)).unwrap();
        let options = &schema["properties"]["next_speaker"]["enum"];
        assert_eq!(options, &serde_json::json!(["positive", "negative", "judge"]));
    }

    #[test]
    fn test_state_without_winner_field_still_loads() {
        let json = r#"{"topic":"X","user_side":"positive","messages":[],"next_speaker":"moderator"}"#;
        let state: DebateState = serde_json::from_str(json).unwrap();
        assert_eq!(state.winner, None);
    }
}
