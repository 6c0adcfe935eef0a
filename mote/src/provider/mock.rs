//! In-process fake provider for orchestrator and compactor tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::message::ToolCall;

use super::{FinishReason, LlmClient, LlmRequest, LlmResponse, LlmUsage, MessageChunk, ToolCallDelta};

/// One scripted response, returned in order by successive `invoke` calls.
/// The last entry repeats once the script is exhausted.
enum Scripted {
    Response(LlmResponse),
    Error(EngineError),
}

/// A provider fake that returns a fixed, or scripted, sequence of responses.
/// Grounded on the teacher's `MockLlm`, generalized to a queue so orchestrator
/// loop tests can script several turns (e.g. one tool call, then a stop).
pub struct MockLlmClient {
    script: Mutex<Vec<Scripted>>,
    acp: bool,
}

impl MockLlmClient {
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(vec![Scripted::Response(LlmResponse {
                content: content.into(),
                tool_calls: Vec::new(),
                usage: Some(LlmUsage::default()),
                finish_reason: FinishReason::Stop,
            })]),
            acp: false,
        }
    }

    pub fn with_tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            script: Mutex::new(vec![Scripted::Response(LlmResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    id: "call-1".to_string(),
                    name: name.into(),
                    arguments,
                    arguments_malformed: false,
                }],
                usage: Some(LlmUsage::default()),
                finish_reason: FinishReason::ToolCalls,
            })]),
            acp: false,
        }
    }

    /// Builds a mock that replays `responses` in order, repeating the last one.
    pub fn sequence(responses: Vec<LlmResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Scripted::Response).collect()),
            acp: false,
        }
    }

    /// Like [`Self::sequence`], but entries can mix `Err` (one scripted
    /// provider error) with `Ok` (a scripted response) instead of only
    /// ever returning responses — used to script a transient failure
    /// followed by a successful retry.
    pub fn scripted_results(results: Vec<Result<LlmResponse, EngineError>>) -> Self {
        Self {
            script: Mutex::new(
                results
                    .into_iter()
                    .map(|r| match r {
                        Ok(resp) => Scripted::Response(resp),
                        Err(e) => Scripted::Error(e),
                    })
                    .collect(),
            ),
            acp: false,
        }
    }

    pub fn failing(err: EngineError) -> Self {
        Self {
            script: Mutex::new(vec![Scripted::Error(err)]),
            acp: false,
        }
    }

    pub fn acp(mut self) -> Self {
        self.acp = true;
        self
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn invoke(
        &self,
        _request: LlmRequest<'_>,
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
        _delta_tx: Option<mpsc::Sender<ToolCallDelta>>,
    ) -> Result<LlmResponse, EngineError> {
        let next = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                match script.first() {
                    Some(Scripted::Response(r)) => Scripted::Response(r.clone()),
                    Some(Scripted::Error(e)) => Scripted::Error(e.clone()),
                    None => {
                        return Err(EngineError::RetryableProviderError(
                            "mock script empty".to_string(),
                        ))
                    }
                }
            }
        };
        match next {
            Scripted::Response(resp) => {
                if let Some(tx) = chunk_tx {
                    if !resp.content.is_empty() {
                        let _ = tx
                            .send(MessageChunk {
                                content: resp.content.clone(),
                                is_thinking: false,
                            })
                            .await;
                    }
                }
                Ok(resp)
            }
            Scripted::Error(e) => Err(e),
        }
    }

    fn is_acp(&self) -> bool {
        self.acp
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_content_returns_stop_and_no_tool_calls() {
        let llm = MockLlmClient::with_content("hi");
        let resp = llm
            .invoke(
                LlmRequest {
                    messages: &[],
                    tools: &[],
                    tool_choice: Default::default(),
                    streaming: true,
                },
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(resp.content, "hi");
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn sequence_replays_in_order_then_repeats_last() {
        let llm = MockLlmClient::sequence(vec![
            LlmResponse {
                content: "first".to_string(),
                tool_calls: vec![],
                usage: None,
                finish_reason: FinishReason::Stop,
            },
            LlmResponse {
                content: "second".to_string(),
                tool_calls: vec![],
                usage: None,
                finish_reason: FinishReason::Stop,
            },
        ]);
        let req = || LlmRequest {
            messages: &[],
            tools: &[],
            tool_choice: Default::default(),
            streaming: false,
        };
        assert_eq!(llm.invoke(req(), None, None).await.unwrap().content, "first");
        assert_eq!(llm.invoke(req(), None, None).await.unwrap().content, "second");
        assert_eq!(llm.invoke(req(), None, None).await.unwrap().content, "second");
    }

    #[tokio::test]
    async fn scripted_results_can_mix_an_error_then_a_response() {
        let llm = MockLlmClient::scripted_results(vec![
            Err(EngineError::RetryableProviderError("rate limited".to_string())),
            Ok(LlmResponse {
                content: "recovered".to_string(),
                tool_calls: vec![],
                usage: None,
                finish_reason: FinishReason::Stop,
            }),
        ]);
        let req = || LlmRequest {
            messages: &[],
            tools: &[],
            tool_choice: Default::default(),
            streaming: false,
        };
        let err = llm.invoke(req(), None, None).await.unwrap_err();
        assert!(matches!(err, EngineError::RetryableProviderError(_)));
        let resp = llm.invoke(req(), None, None).await.unwrap();
        assert_eq!(resp.content, "recovered");
    }
}
