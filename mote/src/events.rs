//! Internal event pipeline. Grounded on `mote-serve`'s copied
//! `run/stream.rs::process_run_stream_event`: `try_send` on a bounded
//! channel, dropping the event and counting it rather than blocking the
//! orchestrator when the receiver (SSE writer or WebSocket hub) falls
//! behind.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mote_protocol::ProtocolEvent;
use tokio::sync::mpsc;

use crate::message::ToolCall;

/// One step of orchestration, emitted on [`EventSink`] in the order it
/// occurs. Converted to [`ProtocolEvent`] at the transport boundary.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    Content { delta: String },
    Thinking { delta: String },
    ToolCall { tool_call: ToolCall },
    ToolCallUpdate { tool_call_id: String, delta: String },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
    Done { usage: Option<serde_json::Value> },
    Error { message: String },
    /// Emitted while a tool call runs longer than the heartbeat interval,
    /// so a client watching a long tool run knows the stream is alive.
    Heartbeat { tool_call_id: String },
    ApprovalRequest { request: serde_json::Value },
    ApprovalResolved { request_id: String, approved: bool },
}

impl EngineEvent {
    /// Converts to the wire shape. The envelope (session/run/event id) is
    /// injected separately by the transport, matching the teacher's
    /// `EnvelopeState`/`to_protocol_event` split.
    pub fn to_protocol_event(&self, session_id: &str) -> ProtocolEvent {
        match self {
            EngineEvent::Content { delta } => ProtocolEvent::Content {
                delta: delta.clone(),
            },
            EngineEvent::Thinking { delta } => ProtocolEvent::Thinking {
                delta: delta.clone(),
            },
            EngineEvent::ToolCall { tool_call } => ProtocolEvent::ToolCall {
                tool_call: serde_json::json!({
                    "id": tool_call.id,
                    "name": tool_call.name,
                    "arguments": tool_call.arguments,
                }),
            },
            EngineEvent::ToolCallUpdate {
                tool_call_id,
                delta,
            } => ProtocolEvent::ToolCallUpdate {
                tool_call: serde_json::json!({
                    "id": tool_call_id,
                    "arguments_delta": delta,
                }),
            },
            EngineEvent::ToolResult {
                tool_call_id,
                tool_name,
                content,
                is_error,
            } => ProtocolEvent::ToolResult {
                tool_result: serde_json::json!({
                    "tool_call_id": tool_call_id,
                    "tool_name": tool_name,
                    "content": content,
                    "is_error": is_error,
                }),
            },
            EngineEvent::Done { usage } => ProtocolEvent::Done {
                session_id: session_id.to_string(),
                usage: usage.clone(),
            },
            EngineEvent::Error { message } => ProtocolEvent::Error {
                message: message.clone(),
            },
            EngineEvent::Heartbeat { tool_call_id } => ProtocolEvent::Heartbeat {
                tool_call_id: tool_call_id.clone(),
            },
            EngineEvent::ApprovalRequest { request } => ProtocolEvent::ApprovalRequest {
                request: request.clone(),
            },
            EngineEvent::ApprovalResolved {
                request_id,
                approved,
            } => ProtocolEvent::ApprovalResolved {
                request_id: request_id.clone(),
                approved: *approved,
            },
        }
    }
}

/// The orchestrator's handle onto one run's event channel. `emit` never
/// blocks: a full channel means a stalled or disconnected reader, and the
/// event is dropped and counted rather than stalling the run.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<EngineEvent>,
    dropped: Arc<AtomicUsize>,
}

impl EventSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                dropped: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        )
    }

    /// Returns `true` if the event was enqueued, `false` if it was dropped.
    pub fn emit(&self, event: EngineEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("event queue full, dropping engine event");
                false
            }
        }
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_event_becomes_a_content_protocol_event() {
        let ev = EngineEvent::Content {
            delta: "hi".to_string(),
        };
        match ev.to_protocol_event("s1") {
            ProtocolEvent::Content { delta } => assert_eq!(delta, "hi"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn done_event_carries_the_session_id() {
        let ev = EngineEvent::Done { usage: None };
        match ev.to_protocol_event("s1") {
            ProtocolEvent::Done { session_id, .. } => assert_eq!(session_id, "s1"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn emit_delivers_while_the_channel_has_room() {
        let (sink, mut rx) = EventSink::new(4);
        assert!(sink.emit(EngineEvent::Content {
            delta: "a".to_string()
        }));
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, EngineEvent::Content { .. }));
        assert_eq!(sink.dropped(), 0);
    }

    #[tokio::test]
    async fn emit_drops_and_counts_when_the_channel_is_full() {
        let (sink, _rx) = EventSink::new(1);
        assert!(sink.emit(EngineEvent::Content {
            delta: "a".to_string()
        }));
        assert!(!sink.emit(EngineEvent::Content {
            delta: "b".to_string()
        }));
        assert_eq!(sink.dropped(), 1);
    }
}
