//! Standard tool-calling orchestrator loop. Per §4.3: hooks, persistence,
//! the bounded provider-call/tool-dispatch loop with retry and compaction,
//! and the per-iteration MCP tool-description mode switch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::compactor::{self, CompactionConfig, CompactionMode, ContextWindowCheck};
use crate::error::EngineError;
use crate::events::{EngineEvent, EventSink};
use crate::hooks::HookDispatcher;
use crate::message::{Message, Role};
use crate::policy::{ApprovalGate, PolicyEngine};
use crate::prompt::{McpToolMode, PromptBuilder, SkillPromptSource};
use crate::provider::{LlmClient, LlmRequest, LlmResponse, ToolChoiceMode};
use crate::queue::Cancellation;
use crate::session::SessionManager;
use crate::tools::ToolRegistry;

use super::dispatch::{ConsecutiveErrorBudget, ToolDispatcher};

/// Tunables the run queue's caller configures once from [`crate::EngineConfig`].
#[derive(Clone, Debug)]
pub struct OrchestratorOptions {
    pub max_iterations: u32,
    pub retry_backoff_secs: Vec<u64>,
    pub max_consecutive_tool_errors: u32,
}

pub struct StandardOrchestrator {
    pub sessions: Arc<SessionManager>,
    pub provider: Arc<dyn LlmClient>,
    pub tools: Arc<ToolRegistry>,
    pub hooks: Arc<HookDispatcher>,
    pub policy: Arc<PolicyEngine>,
    pub approvals: Arc<ApprovalGate>,
    pub prompt_builder: Arc<PromptBuilder>,
    pub skill_source: Arc<dyn SkillPromptSource>,
    pub compaction: CompactionConfig,
    pub options: OrchestratorOptions,
}

impl StandardOrchestrator {
    /// Runs one user turn to completion (or failure). `events` is the sink
    /// the caller's SSE/WebSocket transport reads from.
    pub async fn run_once(
        &self,
        session_id: &str,
        user_input: &str,
        per_request_override: Option<String>,
        mut cancel: Cancellation,
        events: EventSink,
    ) -> Result<(), EngineError> {
        let session = self.sessions.get(session_id).await?;

        let history_before = self.sessions.get_messages(session_id).await?;
        if history_before.is_empty() {
            self.hooks.session_create(session_id).await;
        }

        let user_message = Message::user(session_id, user_input);
        let before = self.hooks.before_message(session_id, &user_message).await;
        if !before.proceed {
            events.emit(EngineEvent::Error {
                message: before
                    .cancellation_reason
                    .unwrap_or_else(|| "message rejected by hook".to_string()),
            });
            return Ok(());
        }

        self.sessions
            .add_message(session_id, Role::User, user_input, Vec::new(), None)
            .await?;
        self.hooks.after_message(session_id, &user_message).await;

        let skill_sections = crate::prompt::skill_sections(&session, self.skill_source.as_ref());
        let tool_specs = self.tools.list();

        let mut messages = self
            .prompt_builder
            .build(
                &session,
                &history_before,
                user_input,
                per_request_override.as_deref(),
                &skill_sections,
                &tool_specs,
                McpToolMode::Full,
            )
            .await;

        let tool_schemas: Vec<serde_json::Value> =
            tool_specs.iter().map(|t| t.to_value()).collect();

        let dispatcher = ToolDispatcher {
            tools: self.tools.clone(),
            policy: self.policy.clone(),
            approvals: self.approvals.clone(),
            hooks: self.hooks.clone(),
            events: events.clone(),
        };

        let mut error_budget = ConsecutiveErrorBudget::new(self.options.max_consecutive_tool_errors);
        let mut force_non_streaming = false;
        let mut context_overflow_retried = false;
        let mut total_usage = crate::provider::LlmUsage::default();

        for iteration in 0..self.options.max_iterations {
            if cancel.is_cancelled() {
                self.sessions
                    .add_message(session_id, Role::Assistant, "[task cancelled]", Vec::new(), None)
                    .await?;
                events.emit(EngineEvent::Error {
                    message: "task cancelled".to_string(),
                });
                return Ok(());
            }

            if iteration > 0 {
                let mode = McpToolMode::Summary;
                let system_text = self
                    .prompt_builder
                    .system_prompt(&session, user_input, &tool_specs, mode, per_request_override.as_deref())
                    .await;
                if let Some(first) = messages.first_mut() {
                    if first.role == Role::System {
                        let mut text = system_text;
                        for section in &skill_sections {
                            text.push_str("\n\n");
                            text.push_str(section);
                        }
                        first.content = text;
                    }
                }
            }

            let overflowing = self.compaction.auto
                && compactor::is_overflow(&ContextWindowCheck {
                    messages: &messages,
                    usage: None,
                    max_context_tokens: self.compaction.max_context_tokens,
                    reserve_tokens: self.compaction.reserve_tokens,
                });
            if overflowing {
                events.emit(EngineEvent::Content {
                    delta: "[compacting context]".to_string(),
                });
                match compactor::compact(&messages, &self.provider, &self.compaction, CompactionMode::Summarize).await {
                    Ok(outcome) if outcome.applied => {
                        messages = outcome.messages;
                        self.sessions
                            .replace_messages(session_id, messages.clone())
                            .await?;
                        force_non_streaming = true;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        events.emit(EngineEvent::Error {
                            message: format!("compaction failed: {e}"),
                        });
                    }
                }
            }

            let streaming = !force_non_streaming;
            force_non_streaming = false;

            let response = match self
                .call_with_retry(&messages, &tool_schemas, streaming, &events, &mut context_overflow_retried)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    events.emit(EngineEvent::Error {
                        message: e.to_string(),
                    });
                    return Ok(());
                }
            };

            if let Some(usage) = response.usage {
                total_usage = total_usage + usage;
            }

            let has_tool_calls = !response.tool_calls.is_empty();
            if response.finish_reason.is_terminal(has_tool_calls) {
                if !response.content.is_empty() {
                    events.emit(EngineEvent::Content {
                        delta: response.content.clone(),
                    });
                }
                self.sessions
                    .add_message(session_id, Role::Assistant, response.content.clone(), Vec::new(), None)
                    .await?;
                events.emit(EngineEvent::Done {
                    usage: Some(serde_json::to_value(total_usage).unwrap_or_default()),
                });
                return Ok(());
            }

            for call in &response.tool_calls {
                events.emit(EngineEvent::ToolCall {
                    tool_call: call.clone(),
                });
            }

            self.sessions
                .add_message(
                    session_id,
                    Role::Assistant,
                    response.content.clone(),
                    response.tool_calls.clone(),
                    None,
                )
                .await?;
            messages.push(Message::assistant(
                session_id,
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                if cancel.is_cancelled() {
                    self.sessions
                        .add_message(session_id, Role::Assistant, "[task cancelled]", Vec::new(), None)
                        .await?;
                    events.emit(EngineEvent::Error {
                        message: "task cancelled".to_string(),
                    });
                    return Ok(());
                }

                let outcome = dispatcher.dispatch(session_id, call).await;
                self.sessions
                    .add_message(
                        session_id,
                        Role::Tool,
                        outcome.message.content.clone(),
                        Vec::new(),
                        Some(call.id.clone()),
                    )
                    .await?;
                messages.push(outcome.message);

                if error_budget.record(outcome.is_error) {
                    events.emit(EngineEvent::Error {
                        message: "too many consecutive tool errors".to_string(),
                    });
                    return Ok(());
                }
            }
        }

        events.emit(EngineEvent::Error {
            message: "max iterations reached".to_string(),
        });
        Ok(())
    }

    /// Issues one provider call, retrying transient errors with the
    /// configured backoff and retrying once on context-window overflow by
    /// forcing compaction.
    async fn call_with_retry(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
        streaming: bool,
        events: &EventSink,
        context_overflow_retried: &mut bool,
    ) -> Result<LlmResponse, EngineError> {
        let mut attempt = 0usize;
        loop {
            match self.call_once(messages, tools, streaming, events).await {
                Ok(response) => return Ok(response),
                Err(EngineError::RetryableProviderError(msg)) => {
                    if attempt >= self.options.retry_backoff_secs.len() {
                        return Err(EngineError::RetryableProviderError(msg));
                    }
                    let delay = Duration::from_secs(self.options.retry_backoff_secs[attempt]);
                    events.emit(EngineEvent::Content {
                        delta: format!("[retrying after transient error: {msg}]"),
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(EngineError::ContextWindowExceeded) if !*context_overflow_retried => {
                    *context_overflow_retried = true;
                    events.emit(EngineEvent::Content {
                        delta: "[context window exceeded, compacting and retrying]".to_string(),
                    });
                    let outcome = compactor::compact(
                        messages,
                        &self.provider,
                        &self.compaction,
                        CompactionMode::Summarize,
                    )
                    .await?;
                    return self
                        .call_once(&outcome.messages, tools, true, events)
                        .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
        streaming: bool,
        events: &EventSink,
    ) -> Result<LlmResponse, EngineError> {
        let (chunk_tx, mut chunk_rx) = mpsc::channel(64);
        let (delta_tx, mut delta_rx) = mpsc::channel(64);
        let request = LlmRequest {
            messages,
            tools,
            tool_choice: ToolChoiceMode::Auto,
            streaming,
        };
        let invoke_fut = self.provider.invoke(request, Some(chunk_tx), Some(delta_tx));
        tokio::pin!(invoke_fut);

        let mut response = None;
        while response.is_none() {
            tokio::select! {
                r = &mut invoke_fut => { response = Some(r); }
                Some(chunk) = chunk_rx.recv() => {
                    let event = if chunk.is_thinking {
                        EngineEvent::Thinking { delta: chunk.content }
                    } else {
                        EngineEvent::Content { delta: chunk.content }
                    };
                    events.emit(event);
                }
                Some(delta) = delta_rx.recv() => {
                    events.emit(EngineEvent::ToolCallUpdate {
                        tool_call_id: delta.call_id.unwrap_or_default(),
                        delta: delta.arguments_delta,
                    });
                }
            }
        }
        while let Ok(chunk) = chunk_rx.try_recv() {
            let event = if chunk.is_thinking {
                EngineEvent::Thinking { delta: chunk.content }
            } else {
                EngineEvent::Content { delta: chunk.content }
            };
            events.emit(event);
        }
        while let Ok(delta) = delta_rx.try_recv() {
            events.emit(EngineEvent::ToolCallUpdate {
                tool_call_id: delta.call_id.unwrap_or_default(),
                delta: delta.arguments_delta,
            });
        }
        response.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EngineEvent as Ev;
    use crate::policy::PolicyEngine;
    use crate::provider::MockLlmClient;
    use crate::queue::cancellation_pair;
    use crate::session::{Scenario, SessionManager, SqliteSessionStore};
    use crate::tools::{ClockTool, ToolRegistry};

    struct NoSkills;
    impl SkillPromptSource for NoSkills {
        fn prompt_fragment(&self, _skill_id: &str) -> Option<String> {
            None
        }
    }

    fn orchestrator(
        provider: Arc<dyn LlmClient>,
    ) -> (tempfile::TempDir, StandardOrchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::new(dir.path().join("mote.db")).unwrap();
        let sessions = Arc::new(SessionManager::new(Arc::new(store), 64));
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(ClockTool));
        let orchestrator = StandardOrchestrator {
            sessions,
            provider,
            tools: Arc::new(tools),
            hooks: Arc::new(HookDispatcher::new()),
            policy: Arc::new(PolicyEngine::new()),
            approvals: Arc::new(ApprovalGate::new()),
            prompt_builder: Arc::new(PromptBuilder::new()),
            skill_source: Arc::new(NoSkills),
            compaction: CompactionConfig::default(),
            options: OrchestratorOptions {
                max_iterations: 10,
                retry_backoff_secs: vec![0, 0],
                max_consecutive_tool_errors: 3,
            },
        };
        (dir, orchestrator)
    }

    async fn drain(mut rx: mpsc::Receiver<Ev>) -> Vec<Ev> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn a_plain_stop_response_persists_the_assistant_message_and_emits_done() {
        let (_dir, orchestrator) = orchestrator(Arc::new(MockLlmClient::with_content("hi there")));
        orchestrator
            .sessions
            .get_or_create("s1", Scenario::Chat)
            .await
            .unwrap();
        let (_cancel_handle, cancel) = cancellation_pair();
        let (sink, rx) = EventSink::new(32);

        orchestrator
            .run_once("s1", "hello", None, cancel, sink)
            .await
            .unwrap();

        let messages = orchestrator.sessions.get_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "hi there");

        let events = drain(rx).await;
        assert!(events.iter().any(|e| matches!(e, Ev::Done { .. })));
    }

    #[tokio::test]
    async fn a_tool_call_response_dispatches_and_then_stops() {
        let llm = MockLlmClient::sequence(vec![
            crate::provider::LlmResponse {
                content: String::new(),
                tool_calls: vec![crate::message::ToolCall {
                    id: "c1".to_string(),
                    name: "clock".to_string(),
                    arguments: serde_json::json!({}),
                    arguments_malformed: false,
                }],
                usage: None,
                finish_reason: crate::provider::FinishReason::ToolCalls,
            },
            crate::provider::LlmResponse {
                content: "done".to_string(),
                tool_calls: vec![],
                usage: None,
                finish_reason: crate::provider::FinishReason::Stop,
            },
        ]);
        let (_dir, orchestrator) = orchestrator(Arc::new(llm));
        orchestrator
            .sessions
            .get_or_create("s1", Scenario::Chat)
            .await
            .unwrap();
        let (_cancel_handle, cancel) = cancellation_pair();
        let (sink, rx) = EventSink::new(32);

        orchestrator
            .run_once("s1", "what time is it", None, cancel, sink)
            .await
            .unwrap();

        let messages = orchestrator.sessions.get_messages("s1").await.unwrap();
        assert!(messages.iter().any(|m| m.role == Role::Tool));
        let events = drain(rx).await;
        assert!(events.iter().any(|e| matches!(e, Ev::ToolCall { .. })));
        assert!(events.iter().any(|e| matches!(e, Ev::ToolResult { .. })));
        assert!(events.iter().any(|e| matches!(e, Ev::Done { .. })));
    }

    #[tokio::test]
    async fn transient_provider_error_retries_before_succeeding() {
        let llm = MockLlmClient::scripted_results(vec![
            Err(EngineError::RetryableProviderError(
                "upstream rate limited".to_string(),
            )),
            Ok(crate::provider::LlmResponse {
                content: "recovered".to_string(),
                tool_calls: vec![],
                usage: None,
                finish_reason: crate::provider::FinishReason::Stop,
            }),
        ]);
        let (_dir, orchestrator) = orchestrator(Arc::new(llm));
        orchestrator
            .sessions
            .get_or_create("s1", Scenario::Chat)
            .await
            .unwrap();
        let (_cancel_handle, cancel) = cancellation_pair();
        let (sink, rx) = EventSink::new(32);
        orchestrator
            .run_once("s1", "hi", None, cancel, sink)
            .await
            .unwrap();

        let messages = orchestrator.sessions.get_messages("s1").await.unwrap();
        assert_eq!(messages[1].content, "recovered");

        let events = drain(rx).await;
        assert!(events.iter().any(|e| matches!(e, Ev::Content { delta } if delta.contains("retrying after transient error"))));
        assert!(events.iter().any(|e| matches!(e, Ev::Done { .. })));
    }

    #[tokio::test]
    async fn transient_provider_error_fails_once_backoff_attempts_are_exhausted() {
        let llm = MockLlmClient::scripted_results(vec![Err(EngineError::RetryableProviderError(
            "upstream rate limited".to_string(),
        ))]);
        // orchestrator()'s fixture allows two retries; a script that only ever
        // errors must exhaust them and fail the run rather than loop forever.
        let (_dir, orchestrator) = orchestrator(Arc::new(llm));
        orchestrator
            .sessions
            .get_or_create("s1", Scenario::Chat)
            .await
            .unwrap();
        let (_cancel_handle, cancel) = cancellation_pair();
        let (sink, _rx) = EventSink::new(32);
        let err = orchestrator
            .run_once("s1", "hi", None, cancel, sink)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RetryableProviderError(_)));
    }

    #[tokio::test]
    async fn a_cancelled_run_appends_a_cancellation_message_and_stops() {
        let (_dir, orchestrator) = orchestrator(Arc::new(MockLlmClient::with_content("hi")));
        orchestrator
            .sessions
            .get_or_create("s1", Scenario::Chat)
            .await
            .unwrap();
        let (cancel_handle, cancel) = cancellation_pair();
        cancel_handle.cancel();
        let (sink, rx) = EventSink::new(32);

        orchestrator
            .run_once("s1", "hello", None, cancel, sink)
            .await
            .unwrap();

        let messages = orchestrator.sessions.get_messages("s1").await.unwrap();
        assert!(messages
            .iter()
            .any(|m| m.content == "[task cancelled]"));
        let events = drain(rx).await;
        assert!(events.iter().any(|e| matches!(e, Ev::Error { .. })));
    }
}
