//! OpenAI-compatible Chat Completions client implementing [`LlmClient`].
//!
//! Talks to any server implementing the OpenAI chat-completions wire format
//! (`OPENAI_BASE_URL`/`OPENAI_API_BASE`, default `https://api.openai.com`).
//! Authentication to the upstream provider is out of scope beyond reading
//! `OPENAI_API_KEY`; the engine does not validate or refresh credentials.

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCalls, ChatCompletionRequestAssistantMessage,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestToolMessage, ChatCompletionRequestUserMessage,
        ChatCompletionTool, ChatCompletionToolChoiceOption, ChatCompletionTools,
        CreateChatCompletionRequestArgs, FunctionObject, ToolChoiceOptions,
    },
    Client,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::EngineError;
use crate::message::{Message, Role, ToolCall};

use super::{
    FinishReason, LlmClient, LlmRequest, LlmResponse, LlmUsage, MessageChunk, ToolCallDelta,
    ToolChoiceMode,
};

/// OpenAI-compatible chat completions client.
pub struct OpenAiCompatClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCompatClient {
    /// Builds a client reading `OPENAI_API_KEY`/`OPENAI_BASE_URL` from the environment.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
        }
    }

    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }

    fn messages_to_request(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(m.content.as_str()),
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(m.content.as_str()),
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessage {
                        content: Some(m.content.clone().into()),
                        ..Default::default()
                    },
                ),
                Role::Tool => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                    content: m.content.clone().into(),
                    tool_call_id: m.tool_call_id.clone().unwrap_or_default(),
                }),
            })
            .collect()
    }

    fn tool_choice_option(mode: ToolChoiceMode) -> ToolChoiceOptions {
        match mode {
            ToolChoiceMode::Auto => ToolChoiceOptions::Auto,
            ToolChoiceMode::None => ToolChoiceOptions::None,
            ToolChoiceMode::Required => ToolChoiceOptions::Required,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn invoke(
        &self,
        request: LlmRequest<'_>,
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
        _delta_tx: Option<mpsc::Sender<ToolCallDelta>>,
    ) -> Result<LlmResponse, EngineError> {
        let openai_messages = Self::messages_to_request(request.messages);
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(openai_messages);

        if !request.tools.is_empty() {
            let chat_tools: Vec<ChatCompletionTools> = request
                .tools
                .iter()
                .filter_map(|spec| {
                    let name = spec.get("name")?.as_str()?.to_string();
                    let description = spec
                        .get("description")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string());
                    let parameters = spec.get("input_schema").cloned();
                    Some(ChatCompletionTools::Function(ChatCompletionTool {
                        function: FunctionObject {
                            name,
                            description,
                            parameters,
                            ..Default::default()
                        },
                    }))
                })
                .collect();
            args.tools(chat_tools);
        }
        args.tool_choice(ChatCompletionToolChoiceOption::Mode(
            Self::tool_choice_option(request.tool_choice),
        ));

        let built = args.build().map_err(|e| {
            EngineError::FatalProviderError(format!("request build failed: {}", e))
        })?;

        debug!(
            model = %self.model,
            message_count = request.messages.len(),
            tools_count = request.tools.len(),
            streaming = request.streaming,
            "provider call"
        );
        if let Ok(js) = serde_json::to_string(&built) {
            trace!(request = %js, "provider request body");
        }

        let response = self.client.chat().create(built).await.map_err(|e| {
            classify_openai_error(&e.to_string())
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::FatalProviderError("no choices in response".to_string()))?;

        let msg = choice.message;
        let content = msg.content.unwrap_or_default();
        let tool_calls: Vec<ToolCall> = msg
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| {
                if let ChatCompletionMessageToolCalls::Function(f) = tc {
                    let (arguments, arguments_malformed) =
                        match serde_json::from_str(&f.function.arguments) {
                            Ok(value) => (value, false),
                            Err(e) => {
                                tracing::warn!(
                                    tool = %f.function.name,
                                    error = %e,
                                    "provider returned malformed tool-call arguments"
                                );
                                (serde_json::Value::Null, true)
                            }
                        };
                    Some(ToolCall {
                        id: f.id,
                        name: f.function.name,
                        arguments,
                        arguments_malformed,
                    })
                } else {
                    None
                }
            })
            .collect();

        let usage = response.usage.map(|u| LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        let finish_reason = if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };

        if let Some(tx) = chunk_tx {
            if !content.is_empty() {
                let _ = tx
                    .send(MessageChunk {
                        content: content.clone(),
                        is_thinking: false,
                    })
                    .await;
            }
        }

        Ok(LlmResponse {
            content,
            tool_calls,
            usage,
            finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Maps an opaque upstream error string to a retryable/fatal [`EngineError`].
/// Rate limits and 5xx responses are transient; everything else is fatal.
fn classify_openai_error(message: &str) -> EngineError {
    let lower = message.to_lowercase();
    let retryable = lower.contains("rate limit")
        || lower.contains("429")
        || lower.contains("500")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("timeout")
        || lower.contains("connection");
    if retryable {
        EngineError::RetryableProviderError(message.to_string())
    } else {
        EngineError::FatalProviderError(message.to_string())
    }
}
