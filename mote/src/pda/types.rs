//! Agent definitions and runtime frame state for the PDA sub-agent engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// One step in an agent's pipeline.
#[derive(Clone, Debug)]
pub enum Step {
    /// One non-looping LLM call; the response is appended to the frame's
    /// context and streamed to the caller.
    Prompt { content: String },
    /// Pushes a new frame for `agent`, seeded only with `[user task]` plus
    /// this step's content and the frame's previous result — the child
    /// never sees the parent's history.
    AgentRef { agent: String, content: String },
    /// A short, unstreamed LLM call whose keyword output selects the next
    /// target via `branches`.
    Route {
        content: String,
        branches: BTreeMap<String, String>,
    },
}

/// A named agent: its own system prompt, step pipeline, and recursion bound.
#[derive(Clone, Debug)]
pub struct AgentDef {
    pub name: String,
    pub system_prompt: Option<String>,
    pub steps: Vec<Step>,
    pub max_recursion: u32,
}

impl AgentDef {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            system_prompt: None,
            steps,
            max_recursion: 5,
        }
    }
}

/// One entry in the PDA's call stack. Serializable so the engine can
/// checkpoint the whole stack into session metadata between ticks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Frame {
    pub agent: String,
    pub step_index: usize,
    pub local_context: Vec<Message>,
    pub recursion_count: u32,
}

impl Frame {
    pub fn root(agent: impl Into<String>, session_id: &str, user_input: &str) -> Self {
        Self {
            agent: agent.into(),
            step_index: 0,
            local_context: vec![Message::user(session_id, user_input)],
            recursion_count: 0,
        }
    }

    /// The most recent assistant output recorded in this frame, used as
    /// `agent_ref`'s "previous result" and as the value returned to a
    /// parent frame when this one pops.
    pub fn last_assistant_output(&self) -> String {
        self.local_context
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}
