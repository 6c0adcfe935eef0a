//! ACP orchestrator: for providers that manage their own tool execution and
//! server-side session state. One streaming call, no dispatch loop. Per
//! §4.7. Grounded on the teacher's `loom-acp` crate's stated role even
//! though its sources were not part of the retrieval pack; the shape here
//! (build once, one call, truncate-only overflow retry) is taken directly
//! from the spec.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::compactor::{self, CompactionConfig, CompactionMode};
use crate::error::EngineError;
use crate::events::{EngineEvent, EventSink};
use crate::message::{Message, Role};
use crate::prompt::{McpToolMode, PromptBuilder, SkillPromptSource};
use crate::provider::{LlmClient, LlmRequest, ToolChoiceMode};
use crate::queue::Cancellation;
use crate::session::SessionManager;

pub struct AcpOrchestrator {
    pub sessions: Arc<SessionManager>,
    pub provider: Arc<dyn LlmClient>,
    pub prompt_builder: Arc<PromptBuilder>,
    pub skill_source: Arc<dyn SkillPromptSource>,
    pub compaction: CompactionConfig,
}

impl AcpOrchestrator {
    pub async fn run_once(
        &self,
        session_id: &str,
        user_input: &str,
        per_request_override: Option<String>,
        cancel: Cancellation,
        events: EventSink,
    ) -> Result<(), EngineError> {
        if cancel.is_cancelled() {
            events.emit(EngineEvent::Error {
                message: "task cancelled".to_string(),
            });
            return Ok(());
        }

        let session = self.sessions.get(session_id).await?;
        let history = self.sessions.get_messages(session_id).await?;

        self.sessions
            .add_message(session_id, Role::User, user_input, Vec::new(), None)
            .await?;

        let skill_sections = crate::prompt::skill_sections(&session, self.skill_source.as_ref());
        let messages = self
            .prompt_builder
            .build(
                &session,
                &history,
                user_input,
                per_request_override.as_deref(),
                &skill_sections,
                &[],
                McpToolMode::Full,
            )
            .await;

        let response = match self.call_once(&messages, true, &events).await {
            Ok(r) => r,
            Err(EngineError::ContextWindowExceeded) => {
                events.emit(EngineEvent::Content {
                    delta: "[context window exceeded, truncating and retrying]".to_string(),
                });
                let outcome = compactor::compact(
                    &messages,
                    &self.provider,
                    &self.compaction,
                    CompactionMode::TruncateOnly,
                )
                .await?;
                self.call_once(&outcome.messages, true, &events).await
            }
            Err(e) => Err(e),
        };

        match response {
            Ok(response) => {
                if !response.content.is_empty() {
                    events.emit(EngineEvent::Content {
                        delta: response.content.clone(),
                    });
                }
                self.sessions
                    .add_message(session_id, Role::Assistant, response.content, Vec::new(), None)
                    .await?;
                events.emit(EngineEvent::Done {
                    usage: response.usage.and_then(|u| serde_json::to_value(u).ok()),
                });
                Ok(())
            }
            Err(e) => {
                events.emit(EngineEvent::Error {
                    message: e.to_string(),
                });
                Ok(())
            }
        }
    }

    async fn call_once(
        &self,
        messages: &[Message],
        streaming: bool,
        events: &EventSink,
    ) -> Result<crate::provider::LlmResponse, EngineError> {
        let (chunk_tx, mut chunk_rx) = mpsc::channel(64);
        let (delta_tx, mut delta_rx) = mpsc::channel(64);
        let request = LlmRequest {
            messages,
            tools: &[],
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
        response.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EngineEvent as Ev;
    use crate::provider::MockLlmClient;
    use crate::queue::cancellation_pair;
    use crate::session::{Scenario, SqliteSessionStore};

    struct NoSkills;
    impl SkillPromptSource for NoSkills {
        fn prompt_fragment(&self, _skill_id: &str) -> Option<String> {
            None
        }
    }

    async fn orchestrator(provider: Arc<dyn LlmClient>) -> (tempfile::TempDir, AcpOrchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::new(dir.path().join("mote.db")).unwrap();
        let sessions = Arc::new(SessionManager::new(Arc::new(store), 64));
        sessions.get_or_create("s1", Scenario::Chat).await.unwrap();
        let orchestrator = AcpOrchestrator {
            sessions,
            provider,
            prompt_builder: Arc::new(PromptBuilder::new()),
            skill_source: Arc::new(NoSkills),
            compaction: CompactionConfig::default(),
        };
        (dir, orchestrator)
    }

    #[tokio::test]
    async fn a_single_call_persists_the_assistant_content_and_emits_done() {
        let (_dir, orchestrator) = orchestrator(Arc::new(MockLlmClient::with_content("hi"))).await;
        let (_cancel_handle, cancel) = cancellation_pair();
        let (sink, mut rx) = EventSink::new(32);

        orchestrator
            .run_once("s1", "hello", None, cancel, sink)
            .await
            .unwrap();

        let messages = orchestrator.sessions.get_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "hi");

        let mut saw_done = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, Ev::Done { .. }) {
                saw_done = true;
            }
        }
        assert!(saw_done);
    }

    #[tokio::test]
    async fn an_already_cancelled_run_emits_error_and_does_nothing_else() {
        let (_dir, orchestrator) = orchestrator(Arc::new(MockLlmClient::with_content("hi"))).await;
        let (cancel_handle, cancel) = cancellation_pair();
        cancel_handle.cancel();
        let (sink, mut rx) = EventSink::new(32);

        orchestrator
            .run_once("s1", "hello", None, cancel, sink)
            .await
            .unwrap();

        let messages = orchestrator.sessions.get_messages("s1").await.unwrap();
        assert!(messages.is_empty());
        let ev = rx.try_recv().unwrap();
        assert!(matches!(ev, Ev::Error { .. }));
    }
}
