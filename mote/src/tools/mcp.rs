//! MCP tool-proxy boundary. Grounded on `tools::mcp_adapter::McpToolAdapter`
//! and `tool_source::McpToolSource`, but the wire protocol (HTTP/JSON-RPC
//! transport, `initialize`/`tools/list`/`tools/call`) is out of scope: only
//! the trait boundary an embedder would implement against a real MCP client
//! is defined here.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngineError;

use super::{Tool, ToolCallContext, ToolOutput, ToolSpec};

/// One tool description as reported by an MCP server's `tools/list`.
pub type McpToolDescriptor = ToolSpec;

/// A source of MCP-proxied tools. An embedder wires a concrete
/// implementation (HTTP, stdio, whichever transport the deployment uses)
/// and registers one [`McpToolAdapter`] per descriptor into the
/// [`super::ToolRegistry`].
#[async_trait]
pub trait McpToolSource: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, EngineError>;
    async fn call_tool(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<ToolOutput, EngineError>;
}

/// Adapts one MCP tool descriptor to [`Tool`] so it sits in the same
/// registry as built-in and skill tools.
pub struct McpToolAdapter {
    spec: McpToolDescriptor,
    source: Arc<dyn McpToolSource>,
}

impl McpToolAdapter {
    pub fn new(spec: McpToolDescriptor, source: Arc<dyn McpToolSource>) -> Self {
        Self { spec, source }
    }
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn call(
        &self,
        args: serde_json::Value,
        _ctx: &ToolCallContext,
    ) -> Result<ToolOutput, EngineError> {
        self.source.call_tool(&self.spec.name, args).await
    }
}

/// Registers every tool a source reports into `registry`.
pub async fn register_mcp_tools(
    registry: &mut super::ToolRegistry,
    source: Arc<dyn McpToolSource>,
) -> Result<(), EngineError> {
    for spec in source.list_tools().await? {
        registry.register(Arc::new(McpToolAdapter::new(spec, source.clone())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticMcpSource;

    #[async_trait]
    impl McpToolSource for StaticMcpSource {
        async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, EngineError> {
            Ok(vec![ToolSpec {
                name: "demo_mcp".to_string(),
                description: Some("demo tool".to_string()),
                input_schema: serde_json::json!({"type": "object"}),
            }])
        }

        async fn call_tool(
            &self,
            _name: &str,
            _args: serde_json::Value,
        ) -> Result<ToolOutput, EngineError> {
            Ok(ToolOutput::ok("adapter-ok"))
        }
    }

    #[tokio::test]
    async fn registered_mcp_tool_is_callable_through_the_registry() {
        let mut registry = super::super::ToolRegistry::new();
        register_mcp_tools(&mut registry, Arc::new(StaticMcpSource))
            .await
            .unwrap();
        assert!(registry.list().iter().any(|s| s.name == "demo_mcp"));

        let ctx = ToolCallContext {
            session_id: "s1".to_string(),
        };
        let out = registry
            .call("demo_mcp", serde_json::json!({"x": 1}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.content, "adapter-ok");
    }
}
