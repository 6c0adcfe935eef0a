use std::sync::Arc;

use futures_util::StreamExt;
use mote::provider::{FinishReason, LlmResponse, MockLlmClient};
use mote::tools::{ClockTool, ToolRegistry};
use mote_serve::ServeConfig;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;

use super::common;

#[tokio::test]
async fn e2e_chat_frame_streams_content_then_done() {
    let (url, _dir, server_handle) = common::spawn_server("hello from the mock provider").await;

    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    common::send_json(
        &mut write,
        json!({"type": "chat", "session": "e2e-1", "message": "hi there"}),
    )
    .await;

    let stream = common::recv_until(&mut read, |v| v["type"] == "stream").await;
    assert_eq!(stream["session"], "e2e-1");
    assert!(stream["delta"].as_str().unwrap().len() > 0);

    let done = common::recv_until(&mut read, |v| v["type"] == "done").await;
    assert_eq!(done["session"], "e2e-1");

    drop(write);
    drop(read);
    server_handle.abort();
}

#[tokio::test]
async fn e2e_ping_gets_a_pong_with_the_same_request_id() {
    let (url, _dir, server_handle) = common::spawn_server("irrelevant").await;

    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    common::send_json(&mut write, json!({"type": "ping", "request_id": "p1"})).await;
    let pong = common::recv_until(&mut read, |v| v["type"] == "pong").await;
    assert_eq!(pong["request_id"], "p1");

    drop(write);
    drop(read);
    server_handle.abort();
}

#[tokio::test]
async fn e2e_tool_call_result_round_trip_carries_the_tool_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(ClockTool));

    let llm = MockLlmClient::sequence(vec![
        LlmResponse {
            content: String::new(),
            tool_calls: vec![mote::message::ToolCall {
                id: "call-1".to_string(),
                name: "clock".to_string(),
                arguments: json!({}),
                arguments_malformed: false,
            }],
            usage: None,
            finish_reason: FinishReason::ToolCalls,
        },
        LlmResponse {
            content: "the time is known".to_string(),
            tool_calls: vec![],
            usage: None,
            finish_reason: FinishReason::Stop,
        },
    ]);

    let mut cfg = ServeConfig::minimal(dir.path().join("mote.db"), Arc::new(llm));
    cfg.tools = Arc::new(tools);
    let (url, server_handle) = common::spawn_server_with_config(cfg).await;

    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    common::send_json(
        &mut write,
        json!({"type": "chat", "session": "e2e-tool-1", "message": "what time is it"}),
    )
    .await;

    let tool_call = common::recv_until(&mut read, |v| v["type"] == "tool_call" && v["tool"]["id"] == "call-1").await;
    assert_eq!(tool_call["tool"]["name"], "clock");

    let tool_result = common::recv_until(&mut read, |v| v["type"] == "tool_result").await;
    assert_eq!(tool_result["tool"]["id"], "call-1");
    assert_eq!(tool_result["tool"]["name"], "clock");

    let done = common::recv_until(&mut read, |v| v["type"] == "done").await;
    assert_eq!(done["session"], "e2e-tool-1");

    drop(write);
    drop(read);
    server_handle.abort();
}

#[tokio::test]
async fn e2e_invalid_json_gets_a_parse_error_frame() {
    use futures_util::SinkExt;
    use tokio_tungstenite::tungstenite::Message;

    let (url, _dir, server_handle) = common::spawn_server("irrelevant").await;

    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    write.send(Message::Text("not valid json".to_string())).await.unwrap();
    let error = common::recv_until(&mut read, |v| v["type"] == "error").await;
    assert!(error["message"].as_str().unwrap().contains("parse error"));

    drop(write);
    drop(read);
    server_handle.abort();
}
