//! Built-in tools that need no external process or sandboxed VM.

use async_trait::async_trait;
use serde_json::json;

use crate::error::EngineError;

use super::{Tool, ToolCallContext, ToolOutput, ToolSpec};

pub const TOOL_CLOCK: &str = "clock";

/// Returns the current UTC time. Exists mainly so a streaming chat run can
/// exercise a real tool call end to end without any external dependency.
pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        TOOL_CLOCK
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_CLOCK.to_string(),
            description: Some("Returns the current UTC time as an ISO-8601 string.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {},
            }),
        }
    }

    async fn call(
        &self,
        _args: serde_json::Value,
        _ctx: &ToolCallContext,
    ) -> Result<ToolOutput, EngineError> {
        Ok(ToolOutput::ok(chrono::Utc::now().to_rfc3339()))
    }
}
