//! Name-keyed tool registry, grounded on `tools::registry::ToolRegistry`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EngineError;

use super::{Tool, ToolCallContext, ToolOutput, ToolSpec};

/// Holds every tool available to a session's orchestrator run: built-ins,
/// skill tools, and MCP-proxied tools are all registered under this one map.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Specs in registration order, for the first-iteration system prompt
    /// and the provider's tool-declaration list.
    pub fn list(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    /// Dispatches to the named tool, or a not-found error tool result when
    /// the model hallucinates a tool name.
    pub async fn call(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolCallContext,
    ) -> Result<ToolOutput, EngineError> {
        match self.get(name) {
            Some(tool) => tool.call(args, ctx).await,
            None => Ok(ToolOutput::error(format!("unknown tool: {}", name))),
        }
    }
}
