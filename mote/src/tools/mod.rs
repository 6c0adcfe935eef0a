//! Tool trait, registry, and built-in/skill/MCP-proxy implementations.
//! Grounded on `tools::r#trait::Tool` and `tools::registry::ToolRegistry`;
//! the dispatch pipeline itself (hooks, policy, heartbeat, truncation) lives
//! in `orchestrator`, which is the caller of this module.

mod builtin;
mod mcp;
mod registry;
#[cfg(feature = "skills")]
mod skill;

pub use builtin::ClockTool;
pub use mcp::{McpToolDescriptor, McpToolSource};
pub use registry::ToolRegistry;
#[cfg(feature = "skills")]
pub use skill::{SkillEnginePool, SkillTool};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Tool description surfaced to the provider and (summarized) to the system
/// prompt. `input_schema` is a JSON Schema object, matching MCP's
/// `tools/list` shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

impl ToolSpec {
    /// The JSON shape the provider call and the first-iteration system
    /// prompt both expect.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.input_schema,
        })
    }
}

/// Result of one tool invocation before dispatch truncates/wraps it into a
/// tool-role message.
#[derive(Clone, Debug)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Per-call context available to a tool: at minimum, the session it is
/// running inside. Tools that need conversation history or workspace paths
/// read them from here rather than threading extra call arguments through
/// the registry.
#[derive(Clone, Debug, Default)]
pub struct ToolCallContext {
    pub session_id: String,
}

/// A single callable tool. Registered by name in a [`ToolRegistry`];
/// dispatched by the orchestrator's tool dispatch pipeline.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn spec(&self) -> ToolSpec;
    async fn call(
        &self,
        args: serde_json::Value,
        ctx: &ToolCallContext,
    ) -> Result<ToolOutput, EngineError>;
}
