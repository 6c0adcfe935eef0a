//! Message and tool-call types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message role. Tool-role messages always carry `tool_call_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single tool invocation requested by the provider from an assistant message.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque id assigned by the provider; unique within the assistant message.
    pub id: String,
    pub name: String,
    /// Raw JSON arguments as returned by the provider (parsed lazily by dispatch).
    /// `Null` here means the provider sent no arguments, a legitimate case;
    /// it is not set when parsing the provider's raw argument string failed.
    pub arguments: serde_json::Value,
    /// Set when the provider's raw argument string failed to parse as JSON.
    /// Kept separate from `arguments` being `Null` so dispatch can tell
    /// "no arguments" apart from "arguments the provider sent were garbage".
    #[serde(default)]
    pub arguments_malformed: bool,
}

/// One message in a session's ordered history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Set only on `Role::Tool` messages; must reference a `ToolCall::id` from an
    /// earlier assistant message in the same session.
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::User, content, Vec::new(), None)
    }

    pub fn system(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::System, content, Vec::new(), None)
    }

    pub fn assistant(
        session_id: impl Into<String>,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self::new(session_id, Role::Assistant, content, tool_calls, None)
    }

    pub fn tool(
        session_id: impl Into<String>,
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self::new(
            session_id,
            Role::Tool,
            content,
            Vec::new(),
            Some(tool_call_id.into()),
        )
    }

    fn new(
        session_id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        tool_call_id: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role,
            content: content.into(),
            tool_calls,
            tool_call_id,
            created_at: Utc::now(),
        }
    }
}
