//! Wire-level event types for one run: type + payload, envelope applied separately.

use serde::Serialize;
use serde_json::Value;

/// One engine event serialized to its wire shape. Matches the SSE/WS event
/// shapes: `{type:"content", delta}`, `{type:"tool_call", tool_call:{...}}`, etc.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    Content { delta: String },
    Thinking { delta: String },
    ToolCall { tool_call: Value },
    ToolCallUpdate { tool_call: Value },
    ToolResult { tool_result: Value },
    Done {
        session_id: String,
        usage: Option<Value>,
    },
    Error { message: String },
    /// Keep-alive emitted while a tool call runs longer than the heartbeat interval.
    Heartbeat { tool_call_id: String },
    /// A sub-agent request awaiting a human decision.
    ApprovalRequest { request: Value },
    ApprovalResolved { request_id: String, approved: bool },
}

impl ProtocolEvent {
    /// Serializes this event to a JSON object (type + payload only; no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_event_serializes_with_type_tag() {
        let ev = ProtocolEvent::Content {
            delta: "hi".to_string(),
        };
        let v = ev.to_value().unwrap();
        assert_eq!(v["type"], "content");
        assert_eq!(v["delta"], "hi");
    }

    #[test]
    fn done_event_carries_session_id() {
        let ev = ProtocolEvent::Done {
            session_id: "s1".to_string(),
            usage: None,
        };
        let v = ev.to_value().unwrap();
        assert_eq!(v["type"], "done");
        assert_eq!(v["session_id"], "s1");
    }
}
