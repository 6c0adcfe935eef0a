//! LLM provider client abstraction and registry.

mod mock;
mod openai;

pub use mock::MockLlmClient;
pub use openai::OpenAiCompatClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::message::{Message, ToolCall};

/// Tool choice mode for a provider call: whether the model may, must not, or
/// must call a tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoiceMode {
    #[default]
    Auto,
    None,
    Required,
}

/// Delta for one in-progress tool call, emitted while a streaming response is
/// still accumulating arguments.
#[derive(Clone, Debug)]
pub struct ToolCallDelta {
    pub call_id: Option<String>,
    pub name: Option<String>,
    pub arguments_delta: String,
}

/// One streamed content or thinking chunk.
#[derive(Clone, Debug)]
pub struct MessageChunk {
    pub content: String,
    pub is_thinking: bool,
}

/// Why the provider stopped generating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    EndTurn,
    ToolCalls,
    Length,
    Other,
}

impl FinishReason {
    /// Whether the orchestrator loop should stop issuing further provider calls.
    pub fn is_terminal(&self, has_tool_calls: bool) -> bool {
        matches!(self, FinishReason::Stop | FinishReason::EndTurn) || !has_tool_calls
    }
}

/// Token usage for one provider call.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl std::ops::Add for LlmUsage {
    type Output = LlmUsage;

    fn add(self, rhs: LlmUsage) -> LlmUsage {
        LlmUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

/// Response from one provider completion.
#[derive(Clone, Debug)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<LlmUsage>,
    pub finish_reason: FinishReason,
}

/// A request to a provider: messages, declared tool schemas, and tool choice.
#[derive(Clone, Debug)]
pub struct LlmRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [serde_json::Value],
    pub tool_choice: ToolChoiceMode,
    /// Non-streaming single-shot call (used to resynchronize the provider
    /// after compaction, and by the compactor's own summarization call).
    pub streaming: bool,
}

/// An LLM client: given a request, returns assistant content and optional
/// tool calls. Implementations: [`MockLlmClient`] (tests),
/// [`OpenAiCompatClient`] (real HTTP API).
///
/// The orchestrator picks between the standard and ACP loop by asking
/// [`LlmClient::is_acp`] rather than inspecting a concrete type.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issues one completion. When `request.streaming` is true and the
    /// implementation supports streaming, content/thinking deltas and tool
    /// call deltas should additionally be sent through `chunk_tx`/`delta_tx`
    /// as they arrive; the full [`LlmResponse`] is always returned at the end.
    async fn invoke(
        &self,
        request: LlmRequest<'_>,
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
        delta_tx: Option<mpsc::Sender<ToolCallDelta>>,
    ) -> Result<LlmResponse, EngineError>;

    /// True for providers that internally manage tool execution and
    /// server-side session state (the ACP orchestrator variant applies).
    fn is_acp(&self) -> bool {
        false
    }

    /// Human-readable model identifier, for logging and usage accounting.
    fn model_name(&self) -> &str;
}

/// Resolves a concrete [`LlmClient`] per session/scenario. A real embedder
/// registers one entry per configured model; tests register a single mock.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: std::collections::HashMap<String, std::sync::Arc<dyn LlmClient>>,
    default_provider: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, client: std::sync::Arc<dyn LlmClient>) {
        let name = name.into();
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.providers.insert(name, client);
    }

    pub fn get(&self, name: &str) -> Option<std::sync::Arc<dyn LlmClient>> {
        self.providers.get(name).cloned()
    }

    pub fn default_client(&self) -> Option<std::sync::Arc<dyn LlmClient>> {
        self.default_provider.as_ref().and_then(|n| self.get(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_stop_is_always_terminal() {
        assert!(FinishReason::Stop.is_terminal(true));
        assert!(FinishReason::Stop.is_terminal(false));
    }

    #[test]
    fn finish_reason_tool_calls_terminal_only_without_calls() {
        assert!(!FinishReason::ToolCalls.is_terminal(true));
        assert!(FinishReason::ToolCalls.is_terminal(false));
    }

    #[test]
    fn registry_returns_first_registered_as_default() {
        let mut reg = ProviderRegistry::new();
        reg.register("a", std::sync::Arc::new(MockLlmClient::with_content("hi")));
        assert!(reg.default_client().is_some());
        assert!(reg.get("missing").is_none());
    }
}
