use crate::state::{ChatMessage, Side};
use anyhow::{Context, Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, ResponseFormat, ResponseFormatJsonSchema,
    },
};
use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use serde_json::Value;
use std::pin::Pin;

/// One incremental delta of a streamed structured response.
#[derive(Debug, Clone, PartialEq)]
pub enum LLMStreamEvent {
    /// Plain content text.
    TextChunk(String),
    /// A partial string of a named function/tool argument payload.
    ArgumentChunk { name: Option<String>, fragment: String },
}

impl LLMStreamEvent {
    /// The raw text this delta contributes to the response body.
    pub fn fragment(&self) -> &str {
        match self {
            LLMStreamEvent::TextChunk(text) => text,
            LLMStreamEvent::ArgumentChunk { fragment, .. } => fragment,
        }
    }
}

/// A stream of deltas from the LLM.
pub type LLMStream = Pin<Box<dyn Stream<Item = Result<LLMStreamEvent>> + Send>>;

/// The structured output shape requested from the model.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    /// Schema name sent to the provider (e.g. `moderator_output`).
    pub name: String,
    /// JSON schema of the expected object.
    pub schema: Value,
}

impl OutputSchema {
    /// Builds the schema for any `JsonSchema` type.
    pub fn of<T: schemars::JsonSchema>(name: &str) -> Self {
        let mut schema = serde_json::to_value(schemars::schema_for!(T))
            .unwrap_or_else(|_| Value::Object(Default::default()));
        if let Value::Object(map) = &mut schema {
            map.remove("$schema");
        }
        Self {
            name: name.to_string(),
            schema,
        }
    }
}

/// Everything needed for one structured model call.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRequest {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    /// Messages from this side were written by the human participant.
    pub human_side: Side,
    pub output: OutputSchema,
}

/// A language model able to answer with a JSON object of a given schema.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StructuredOutputClient: Send + Sync {
    /// Makes a single, non-streaming call and returns the decoded JSON object.
    async fn invoke(&self, request: StructuredRequest) -> Result<Value>;

    /// Streams the response as deltas of its JSON text.
    ///
    /// The default implementation replays [`invoke`](Self::invoke) as a
    /// single text delta.
    async fn invoke_stream(&self, request: StructuredRequest) -> Result<LLMStream> {
        let value = self.invoke(request).await?;
        let text = serde_json::to_string(&value)?;
        Ok(Box::pin(stream::once(async move {
            Ok(LLMStreamEvent::TextChunk(text))
        })))
    }
}

/// Builds a stream of text deltas, for tests that script model responses.
#[cfg(test)]
pub(crate) fn text_stream(parts: &[&str]) -> LLMStream {
    let events: Vec<Result<LLMStreamEvent>> = parts
        .iter()
        .map(|part| Ok(LLMStreamEvent::TextChunk(part.to_string())))
        .collect();
    Box::pin(stream::iter(events))
}

/// An implementation of `StructuredOutputClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use for chat completions (e.g., "gpt-5-mini").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            temperature: None,
        }
    }

    /// Sets the sampling temperature. Some reasoning models reject it, so it is opt-in.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_request(
        &self,
        request: StructuredRequest,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(to_request_messages(&request)?)
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: request.output.name,
                    schema: Some(request.output.schema),
                    strict: Some(true),
                },
            })
            .stream(stream);
        if let Some(temperature) = self.temperature {
            args.temperature(temperature);
        }
        Ok(args.build()?)
    }
}

/// Renders the system prompt and debate history as chat messages.
///
/// The human's statements become user messages; every AI participant's
/// statement becomes an assistant message carrying the speaker's name.
fn to_request_messages(request: &StructuredRequest) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system_prompt.clone())
            .build()?
            .into(),
    ];
    for msg in &request.history {
        let message = if msg.role.side() == Some(request.human_side) {
            ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content.clone())
                .name(msg.role.as_str())
                .build()?
                .into()
        } else {
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(msg.content.clone())
                .name(msg.role.as_str())
                .build()?
                .into()
        };
        messages.push(message);
    }
    Ok(messages)
}

#[async_trait]
impl StructuredOutputClient for OpenAICompatibleClient {
    async fn invoke(&self, request: StructuredRequest) -> Result<Value> {
        let request = self.build_request(request, false)?;
        let response: CreateChatCompletionResponse = self.client.chat().create(request).await?;
        let choice = response
            .choices
            .first()
            .context("No response choice from LLM")?;

        if let Some(content) = &choice.message.content {
            serde_json::from_str(content).context("LLM content was not a JSON object")
        } else if let Some(call) = choice.message.tool_calls.as_ref().and_then(|c| c.first()) {
            serde_json::from_str(&call.function.arguments)
                .context("LLM tool arguments were not a JSON object")
        } else {
            Err(anyhow!(
                "LLM response had neither text content nor tool calls."
            ))
        }
    }

    async fn invoke_stream(&self, request: StructuredRequest) -> Result<LLMStream> {
        let request = self.build_request(request, true)?;
        let stream = self.client.chat().create_stream(request).await?;

        Ok(Box::pin(stream.filter_map(|result| async move {
            match result {
                Ok(response) => {
                    let choice = response.choices.first()?;
                    if let Some(content) = &choice.delta.content {
                        if !content.is_empty() {
                            return Some(Ok(LLMStreamEvent::TextChunk(content.clone())));
                        }
                    }
                    let function = choice.delta.tool_calls.as_ref()?.first()?.function.as_ref()?;
                    let fragment = function.arguments.clone().filter(|a| !a.is_empty())?;
                    Some(Ok(LLMStreamEvent::ArgumentChunk {
                        name: function.name.clone(),
                        fragment,
                    }))
                }
                Err(e) => Some(Err(anyhow::Error::new::<OpenAIError>(e))),
            }
        })))
    }
}
