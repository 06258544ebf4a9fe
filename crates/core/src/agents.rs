//! Debate Agents
//!
//! The moderator, AI debater and judge are the same structured-output client
//! driven with different system prompts and output schemas.

use crate::{
    error::{DebateError, Result},
    graph::Node,
    llm_client::{LLMStream, OutputSchema, StructuredOutputClient, StructuredRequest},
    state::{DebateState, DebaterOutput, JudgeOutput, ModeratorOutput, Side},
};
use serde::de::DeserializeOwned;
use std::{collections::HashMap, sync::Arc};

const MODERATOR_PROMPT: &str = include_str!("../prompts/moderator.md");
const DEBATER_PROMPT: &str = include_str!("../prompts/debater.md");
const JUDGE_PROMPT: &str = include_str!("../prompts/judge.md");

/// System prompt templates. `{topic}` and `{position}` are substituted per turn.
#[derive(Debug, Clone, PartialEq)]
pub struct DebatePrompts {
    pub moderator: String,
    pub debater: String,
    pub judge: String,
}

impl Default for DebatePrompts {
    fn default() -> Self {
        Self {
            moderator: MODERATOR_PROMPT.to_string(),
            debater: DEBATER_PROMPT.to_string(),
            judge: JUDGE_PROMPT.to_string(),
        }
    }
}

impl DebatePrompts {
    /// Replaces the built-in templates with any of `"moderator"`, `"debater"`
    /// or `"judge"` found in `prompts`. Other keys are ignored.
    pub fn with_overrides(mut self, mut prompts: HashMap<String, String>) -> Self {
        if let Some(p) = prompts.remove("moderator") {
            self.moderator = p;
        }
        if let Some(p) = prompts.remove("debater") {
            self.debater = p;
        }
        if let Some(p) = prompts.remove("judge") {
            self.judge = p;
        }
        self
    }

    pub fn moderator(&self, topic: &str) -> String {
        self.moderator.replace("{topic}", topic)
    }

    pub fn debater(&self, topic: &str, position: Side) -> String {
        let position = match position {
            Side::Positive => "positive (in favour of the motion)",
            Side::Negative => "negative (against the motion)",
        };
        self.debater
            .replace("{topic}", topic)
            .replace("{position}", position)
    }

    pub fn judge(&self, topic: &str) -> String {
        self.judge.replace("{topic}", topic)
    }
}

/// Builds and issues the model call for each speaking node.
pub struct DebateAgents {
    client: Arc<dyn StructuredOutputClient>,
    prompts: DebatePrompts,
}

impl DebateAgents {
    pub fn new(client: Arc<dyn StructuredOutputClient>, prompts: DebatePrompts) -> Self {
        Self { client, prompts }
    }

    /// The request for `node` given the current state; `None` for the human
    /// node, which is never answered by the model.
    pub fn request(&self, node: Node, state: &DebateState) -> Option<StructuredRequest> {
        let (system_prompt, output) = match node {
            Node::Moderator => (
                self.prompts.moderator(&state.topic),
                OutputSchema::of::<ModeratorOutput>("moderator_output"),
            ),
            Node::Debater => (
                self.prompts.debater(&state.topic, state.ai_side()),
                OutputSchema::of::<DebaterOutput>("debater_output"),
            ),
            Node::Judge => (
                self.prompts.judge(&state.topic),
                OutputSchema::of::<JudgeOutput>("judge_output"),
            ),
            Node::Human => return None,
        };
        Some(StructuredRequest {
            system_prompt,
            history: state.messages.clone(),
            human_side: state.user_side,
            output,
        })
    }

    /// Starts the streamed model call for `node`.
    pub async fn stream(&self, node: Node, state: &DebateState) -> Result<LLMStream> {
        let request = self.request(node, state).ok_or_else(|| {
            DebateError::ContractViolation(format!("node '{node}' is not answered by the model"))
        })?;
        self.client
            .invoke_stream(request)
            .await
            .map_err(DebateError::Capability)
    }
}

/// Decodes the complete response text of `node` into its output schema.
pub fn decode<T: DeserializeOwned>(node: Node, raw: &str) -> Result<T> {
    if raw.trim().is_empty() {
        return Err(DebateError::ContractViolation(format!(
            "{node} returned an empty response"
        )));
    }
    serde_json::from_str(raw).map_err(|e| {
        DebateError::ContractViolation(format!("{node} output does not match its schema: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{MockStructuredOutputClient, text_stream};
    use crate::state::{ChatMessage, Role};
    use futures::StreamExt;

    #[test]
    fn test_builtin_prompts_are_templated() {
        let prompts = DebatePrompts::default();
        let text = prompts.moderator("Cats vs dogs");
        assert!(text.contains("Cats vs dogs"));
        assert!(!text.contains("{topic}"));

        let text = prompts.debater("Cats vs dogs", Side::Negative);
        assert!(text.contains("negative (against the motion)"));
        assert!(!text.contains("{position}"));
    }

    #[test]
    fn test_prompt_overrides() {
        let overrides = HashMap::from([
            ("judge".to_string(), "Decide {topic} now.".to_string()),
            ("system_prompt".to_string(), "ignored".to_string()),
        ]);
        let prompts = DebatePrompts::default().with_overrides(overrides);
        assert_eq!(prompts.judge("X"), "Decide X now.");
        assert_eq!(prompts.moderator, DebatePrompts::default().moderator);
    }

    #[test]
    fn test_debater_request_argues_against_the_user() {
        let agents = DebateAgents::new(
            Arc::new(MockStructuredOutputClient::new()),
            DebatePrompts::default(),
        );
        let mut state = DebateState::new("Nuclear power", Side::Negative);
        state.messages.push(ChatMessage::new(Role::Moderator, "Welcome."));

        let request = agents.request(Node::Debater, &state).unwrap();
        assert!(request.system_prompt.contains("positive (in favour of the motion)"));
        assert_eq!(request.history.len(), 1);
        assert_eq!(request.output.name, "debater_output");
        assert_eq!(request.human_side, Side::Negative);
        assert!(agents.request(Node::Human, &state).is_none());
    }

    #[tokio::test]
    async fn test_stream_uses_judge_schema() {
        let mut client = MockStructuredOutputClient::new();
        client
            .expect_invoke_stream()
            .withf(|req| req.output.name == "judge_output")
            .times(1)
            .returning(|_| Ok(text_stream(&["{}"])));
        let agents = DebateAgents::new(Arc::new(client), DebatePrompts::default());
        let state = DebateState::new("X", Side::Positive);

        let mut stream = agents.stream(Node::Judge, &state).await.unwrap();
        assert!(stream.next().await.is_some());
    }

    #[tokio::test]
    async fn test_capability_failure_is_wrapped() {
        let mut client = MockStructuredOutputClient::new();
        client
            .expect_invoke_stream()
            .returning(|_| Err(anyhow::anyhow!("rate limited")));
        let agents = DebateAgents::new(Arc::new(client), DebatePrompts::default());
        let state = DebateState::new("X", Side::Positive);

        let err = agents.stream(Node::Moderator, &state).await.err().unwrap();
        assert!(matches!(err, DebateError::Capability(_)));
    }

    #[test]
    fn test_decode_rejects_schema_mismatch() {
        let ok: DebaterOutput = decode(Node::Debater, r#"{"script":"Yes."}"#).unwrap();
        assert_eq!(ok.script, "Yes.");

        let err = decode::<JudgeOutput>(Node::Judge, r#"{"script":"Tie."}"#).unwrap_err();
        assert!(matches!(err, DebateError::ContractViolation(_)));

        let err = decode::<DebaterOutput>(Node::Debater, "  ").unwrap_err();
        assert!(err.to_string().contains("empty response"));
    }
}
