//! PDA sub-agent engine. Per §4.8: a stack of frames, ticked until empty,
//! checkpointed into session metadata at each step boundary and frame
//! push/pop. Grounded on the teacher's `Checkpointer<S>` persistence
//! boundary, generalized from a `(thread_id, checkpoint_ns, checkpoint_id)`
//! keyed store to a single JSON blob under the session's own metadata, since
//! a PDA stack is always scoped to the one session that started it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::events::{EngineEvent, EventSink};
use crate::message::Message;
use crate::provider::{LlmClient, LlmRequest, LlmResponse, ToolChoiceMode};
use crate::queue::Cancellation;
use crate::session::{Session, SessionManager};

use super::route::match_route;
use super::types::{AgentDef, Frame, Step};

const METADATA_KEY: &str = "pda_stack";

/// Drives one or more registered [`AgentDef`]s. Holds no session-specific
/// state itself; everything in flight lives in the frame stack, which is
/// loaded from and persisted back into session metadata.
pub struct PdaEngine {
    pub sessions: Arc<SessionManager>,
    pub provider: Arc<dyn LlmClient>,
    pub agents: HashMap<String, AgentDef>,
}

impl PdaEngine {
    pub fn new(sessions: Arc<SessionManager>, provider: Arc<dyn LlmClient>) -> Self {
        Self {
            sessions,
            provider,
            agents: HashMap::new(),
        }
    }

    pub fn register(&mut self, agent: AgentDef) {
        self.agents.insert(agent.name.clone(), agent);
    }

    /// True when a prior run on this session left a frame stack behind — the
    /// transport layer surfaces this as a `pda_control` affordance offering
    /// continue-from-checkpoint or restart.
    pub async fn has_checkpoint(&self, session_id: &str) -> Result<bool, EngineError> {
        let session = self.sessions.get(session_id).await?;
        Ok(load_checkpoint(&session)?.is_some())
    }

    /// Runs until the stack empties, returning the root frame's final
    /// assistant output. `resume` continues a previously checkpointed stack
    /// rather than starting a fresh one from `root_agent`/`user_input`.
    pub async fn run(
        &self,
        session_id: &str,
        root_agent: &str,
        user_input: &str,
        resume: bool,
        mut cancel: Cancellation,
        events: EventSink,
    ) -> Result<String, EngineError> {
        let session = self.sessions.get(session_id).await?;
        let mut stack = if resume {
            load_checkpoint(&session)?
                .ok_or_else(|| EngineError::RunNotFound(session_id.to_string()))?
        } else {
            vec![Frame::root(root_agent, session_id, user_input)]
        };

        loop {
            if cancel.is_cancelled() {
                self.checkpoint(session_id, &stack).await?;
                events.emit(EngineEvent::Error {
                    message: "task cancelled".to_string(),
                });
                return Err(EngineError::ContextCancelled);
            }

            let Some(top) = stack.last().cloned() else {
                break;
            };
            let agent = self
                .agents
                .get(&top.agent)
                .ok_or_else(|| EngineError::AgentNotFound(top.agent.clone()))?
                .clone();

            if top.step_index >= agent.steps.len() {
                let finished = stack.pop().expect("checked non-empty above");
                let result = finished.last_assistant_output();
                match stack.last_mut() {
                    None => {
                        self.checkpoint(session_id, &stack).await?;
                        return Ok(result);
                    }
                    Some(parent) => {
                        parent.local_context.push(Message::assistant(
                            session_id,
                            format!("[agent result] {result}"),
                            Vec::new(),
                        ));
                        parent.step_index += 1;
                    }
                }
                self.checkpoint(session_id, &stack).await?;
                continue;
            }

            let step = agent.steps[top.step_index].clone();
            match step {
                Step::Prompt { content } => {
                    let response = self
                        .call(
                            session_id,
                            &agent,
                            &top.local_context,
                            &content,
                            true,
                            Some(&events),
                        )
                        .await?;
                    let frame = stack.last_mut().expect("checked non-empty above");
                    frame
                        .local_context
                        .push(Message::assistant(session_id, response.content, Vec::new()));
                    frame.step_index += 1;
                }
                Step::AgentRef {
                    agent: child_name,
                    content,
                } => {
                    if !self.agents.contains_key(&child_name) {
                        return Err(EngineError::AgentNotFound(child_name));
                    }
                    let previous_result = top.last_assistant_output();
                    let seed = format!("[user task]\n{content}{previous_result}");
                    stack.push(Frame {
                        agent: child_name,
                        step_index: 0,
                        local_context: vec![Message::user(session_id, seed)],
                        recursion_count: 0,
                    });
                }
                Step::Route { content, branches } => {
                    let response = self
                        .call(session_id, &agent, &top.local_context, &content, false, None)
                        .await?;
                    let target = match_route(response.content.trim(), &branches)
                        .unwrap_or_else(|| "_end".to_string());
                    let frame = stack.last_mut().expect("checked non-empty above");
                    if target == "_end" {
                        frame.step_index = agent.steps.len().saturating_sub(1);
                    } else if target == frame.agent {
                        frame.recursion_count += 1;
                        if frame.recursion_count > agent.max_recursion {
                            // Cap hit: terminate this agent the same way `_end`
                            // does, rather than failing the whole run. A
                            // self-recursive path executes the recursive agent
                            // at most `max_recursion + 1` times.
                            frame.step_index = agent.steps.len().saturating_sub(1);
                        } else {
                            frame.step_index = 0;
                        }
                    } else {
                        if !self.agents.contains_key(&target) {
                            return Err(EngineError::AgentNotFound(target));
                        }
                        let context_copy = frame.local_context.clone();
                        stack.push(Frame {
                            agent: target,
                            step_index: 0,
                            local_context: context_copy,
                            recursion_count: 0,
                        });
                    }
                }
            }

            self.checkpoint(session_id, &stack).await?;
        }

        Ok(String::new())
    }

    /// One LLM call against `agent`'s system prompt, `context`, and the
    /// step's own content. `events` is `None` for route steps: their
    /// keyword output is consumed internally and must never reach the
    /// caller, streaming or otherwise.
    async fn call(
        &self,
        session_id: &str,
        agent: &AgentDef,
        context: &[Message],
        step_content: &str,
        streaming: bool,
        events: Option<&EventSink>,
    ) -> Result<LlmResponse, EngineError> {
        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(Message::system(
            session_id,
            agent.system_prompt.clone().unwrap_or_default(),
        ));
        messages.extend_from_slice(context);
        messages.push(Message::user(session_id, step_content));

        let (chunk_tx, mut chunk_rx) = mpsc::channel(64);
        let request = LlmRequest {
            messages: &messages,
            tools: &[],
            tool_choice: ToolChoiceMode::None,
            streaming,
        };
        let invoke_fut = self.provider.invoke(request, Some(chunk_tx), None);
        tokio::pin!(invoke_fut);

        let mut response = None;
        while response.is_none() {
            tokio::select! {
                r = &mut invoke_fut => { response = Some(r); }
                Some(chunk) = chunk_rx.recv() => {
                    if let Some(events) = events {
                        let event = if chunk.is_thinking {
                            EngineEvent::Thinking { delta: chunk.content }
                        } else {
                            EngineEvent::Content { delta: chunk.content }
                        };
                        events.emit(event);
                    }
                }
            }
        }
        response.unwrap()
    }

    async fn checkpoint(&self, session_id: &str, stack: &[Frame]) -> Result<(), EngineError> {
        let session = self.sessions.get(session_id).await?;
        let mut metadata = session.metadata;
        if !metadata.is_object() {
            metadata = serde_json::json!({});
        }
        let obj = metadata.as_object_mut().expect("just ensured this is an object");
        if stack.is_empty() {
            obj.remove(METADATA_KEY);
        } else {
            obj.insert(METADATA_KEY.to_string(), serde_json::to_value(stack)?);
        }
        self.sessions.set_metadata(session_id, metadata).await
    }
}

fn load_checkpoint(session: &Session) -> Result<Option<Vec<Frame>>, EngineError> {
    match session.metadata.get(METADATA_KEY) {
        Some(value) if !value.is_null() => Ok(Some(serde_json::from_value(value.clone())?)),
        _ => Ok(None),
    }
}
