//! Wire shapes for the WebSocket hub (§4.10/§6) and the outbound
//! engine-event-to-frame mapping shared by the SSE writer and the hub.
//!
//! Grounded on `mote-protocol::ProtocolEvent`'s tagged-enum shape and the
//! teacher's copied `run/stream.rs::process_run_stream_event`, which wraps
//! each engine event in an envelope before handing it to the transport; here
//! the envelope is a flat `session` field rather than the teacher's
//! `ProtocolEventEnvelope` struct, since the WS frame shape in §6 is its own
//! loose bag of optional fields rather than a fixed envelope+event pair.

use mote::events::EngineEvent;
use serde::Deserialize;
use serde_json::{json, Value};

/// Inbound WebSocket frame types recognized per §6.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { session: String },
    Unsubscribe { session: String },
    Ping { request_id: Option<String> },
    Chat { session: String, message: String },
    ApprovalResponse { request_id: String, approved: bool },
    /// Starts (or resumes) a PDA sub-agent run (§4.8) on `session`. `resume`
    /// defaults to `false` so a plain `{"type": "pda_run", ...}` frame starts
    /// `agent` fresh; a client that saw `has_checkpoint` true for this
    /// session sets it to continue the stack left behind instead.
    PdaRun {
        session: String,
        agent: String,
        message: String,
        #[serde(default)]
        resume: bool,
    },
}

/// Maps one internal engine event to the outbound WS frame shape. `Heartbeat`
/// carries no dedicated outbound type in §6; it rides on `tool_call` with a
/// `heartbeat: true` marker so a client watching a long tool run can tell the
/// stream is still alive without special-casing a new frame type.
pub fn to_ws_frame(event: &EngineEvent, session_id: &str) -> Value {
    match event {
        EngineEvent::Content { delta } => json!({
            "type": "stream",
            "session": session_id,
            "delta": delta,
        }),
        EngineEvent::Thinking { delta } => json!({
            "type": "stream",
            "session": session_id,
            "delta": delta,
            "thinking": true,
        }),
        EngineEvent::ToolCall { tool_call } => json!({
            "type": "tool_call",
            "session": session_id,
            "tool": {
                "id": tool_call.id,
                "name": tool_call.name,
                "arguments": tool_call.arguments,
            },
        }),
        EngineEvent::ToolCallUpdate { tool_call_id, delta } => json!({
            "type": "tool_call",
            "session": session_id,
            "tool": { "id": tool_call_id, "arguments_delta": delta },
        }),
        EngineEvent::ToolResult { tool_call_id, tool_name, content, is_error } => json!({
            "type": "tool_result",
            "session": session_id,
            "tool": { "id": tool_call_id, "name": tool_name, "output": content, "is_error": is_error },
        }),
        EngineEvent::Done { usage } => json!({
            "type": "done",
            "session": session_id,
            "payload": usage,
        }),
        EngineEvent::Error { message } => json!({
            "type": "error",
            "session": session_id,
            "message": message,
        }),
        EngineEvent::Heartbeat { tool_call_id } => json!({
            "type": "tool_call",
            "session": session_id,
            "tool": { "id": tool_call_id, "heartbeat": true },
        }),
        EngineEvent::ApprovalRequest { request } => json!({
            "type": "approval_request",
            "session": session_id,
            "payload": request,
        }),
        EngineEvent::ApprovalResolved { request_id, approved } => json!({
            "type": "approval_resolved",
            "session": session_id,
            "request_id": request_id,
            "approved": approved,
        }),
    }
}

/// Maps one internal engine event to the SSE event shapes in §6, which are
/// flatter than the WS frame (no envelope, `content`/`thinking` keep their
/// own type tags instead of sharing `stream`).
pub fn to_sse_value(event: &EngineEvent, session_id: &str) -> Option<Value> {
    match event {
        EngineEvent::Content { delta } => Some(json!({"type": "content", "delta": delta})),
        EngineEvent::Thinking { delta } => Some(json!({"type": "thinking", "delta": delta})),
        EngineEvent::ToolCall { tool_call } => Some(json!({
            "type": "tool_call",
            "tool_call": { "id": tool_call.id, "name": tool_call.name, "arguments": tool_call.arguments },
        })),
        EngineEvent::ToolCallUpdate { .. } => None,
        EngineEvent::ToolResult { tool_call_id, tool_name, content, is_error } => Some(json!({
            "type": "tool_result",
            "tool_result": { "tool_call_id": tool_call_id, "tool_name": tool_name, "output": content, "is_error": is_error },
        })),
        EngineEvent::Done { .. } => Some(json!({"type": "done", "session_id": session_id})),
        EngineEvent::Error { message } => Some(json!({"type": "error", "message": message})),
        EngineEvent::Heartbeat { .. } => None,
        EngineEvent::ApprovalRequest { request } => {
            Some(json!({"type": "approval_request", "request": request}))
        }
        EngineEvent::ApprovalResolved { request_id, approved } => Some(json!({
            "type": "approval_resolved",
            "request_id": request_id,
            "approved": approved,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mote::message::ToolCall;

    #[test]
    fn content_becomes_a_stream_ws_frame() {
        let ev = EngineEvent::Content { delta: "hi".to_string() };
        let frame = to_ws_frame(&ev, "s1");
        assert_eq!(frame["type"], "stream");
        assert_eq!(frame["session"], "s1");
        assert_eq!(frame["delta"], "hi");
    }

    #[test]
    fn tool_call_carries_name_and_arguments() {
        let ev = EngineEvent::ToolCall {
            tool_call: ToolCall {
                id: "c1".to_string(),
                name: "clock".to_string(),
                arguments: json!({}),
                arguments_malformed: false,
            },
        };
        let frame = to_ws_frame(&ev, "s1");
        assert_eq!(frame["type"], "tool_call");
        assert_eq!(frame["tool"]["name"], "clock");
    }

    #[test]
    fn tool_result_ws_frame_carries_the_tool_name_not_the_call_id() {
        let ev = EngineEvent::ToolResult {
            tool_call_id: "c1".to_string(),
            tool_name: "clock".to_string(),
            content: "12:00".to_string(),
            is_error: false,
        };
        let frame = to_ws_frame(&ev, "s1");
        assert_eq!(frame["tool"]["id"], "c1");
        assert_eq!(frame["tool"]["name"], "clock");
        assert_eq!(frame["tool"]["output"], "12:00");
    }

    #[test]
    fn tool_result_sse_value_carries_the_tool_name_not_the_call_id() {
        let ev = EngineEvent::ToolResult {
            tool_call_id: "c1".to_string(),
            tool_name: "clock".to_string(),
            content: "12:00".to_string(),
            is_error: false,
        };
        let value = to_sse_value(&ev, "s1").unwrap();
        assert_eq!(value["tool_result"]["tool_name"], "clock");
        assert_eq!(value["tool_result"]["output"], "12:00");
    }

    #[test]
    fn content_sse_value_uses_its_own_type_tag() {
        let ev = EngineEvent::Content { delta: "hi".to_string() };
        let value = to_sse_value(&ev, "s1").unwrap();
        assert_eq!(value["type"], "content");
        assert_eq!(value["delta"], "hi");
    }

    #[test]
    fn done_sse_value_carries_session_id() {
        let ev = EngineEvent::Done { usage: None };
        let value = to_sse_value(&ev, "s1").unwrap();
        assert_eq!(value["type"], "done");
        assert_eq!(value["session_id"], "s1");
    }

    #[test]
    fn heartbeat_and_tool_call_update_are_suppressed_on_sse() {
        let update = EngineEvent::ToolCallUpdate {
            tool_call_id: "c1".to_string(),
            delta: "{".to_string(),
        };
        let heartbeat = EngineEvent::Heartbeat { tool_call_id: "c1".to_string() };
        assert!(to_sse_value(&update, "s1").is_none());
        assert!(to_sse_value(&heartbeat, "s1").is_none());
    }

    #[test]
    fn client_frame_parses_chat_and_approval_response() {
        let chat: ClientFrame =
            serde_json::from_value(json!({"type": "chat", "session": "s1", "message": "hi"}))
                .unwrap();
        assert!(matches!(chat, ClientFrame::Chat { .. }));

        let approval: ClientFrame = serde_json::from_value(json!({
            "type": "approval_response",
            "request_id": "r1",
            "approved": true,
        }))
        .unwrap();
        assert!(matches!(approval, ClientFrame::ApprovalResponse { approved: true, .. }));
    }

    #[test]
    fn pda_run_defaults_resume_to_false() {
        let frame: ClientFrame = serde_json::from_value(json!({
            "type": "pda_run",
            "session": "s1",
            "agent": "root",
            "message": "go",
        }))
        .unwrap();
        assert!(matches!(frame, ClientFrame::PdaRun { resume: false, .. }));
    }
}
