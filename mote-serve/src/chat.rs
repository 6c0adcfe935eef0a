//! `POST /api/v1/chat` and `POST /api/v1/chat/stream` (§6). Both enqueue a
//! chat turn through [`crate::app::Engine::start_chat`] and differ only in
//! how they drain the resulting event stream: `/chat` collects it into one
//! JSON reply, `/chat/stream` forwards each event as an SSE line.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

use mote::events::EngineEvent;

use crate::app::AppState;
use crate::frame::to_sse_value;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<Value>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let session_id = req.session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut events = match state.engine.start_chat(&session_id, req.message, None) {
        Ok(rx) => rx,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody { error: e.to_string() }),
            )
                .into_response();
        }
    };

    let mut message = String::new();
    let mut tool_calls = Vec::new();
    let mut error = None;

    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::Content { delta } => message.push_str(&delta),
            EngineEvent::ToolCall { tool_call } => tool_calls.push(serde_json::json!({
                "id": tool_call.id,
                "name": tool_call.name,
                "arguments": tool_call.arguments,
            })),
            EngineEvent::Error { message: err_message } => {
                error = Some(err_message);
                break;
            }
            EngineEvent::Done { .. } => break,
            _ => {}
        }
    }

    if let Some(error) = error {
        return (StatusCode::BAD_GATEWAY, Json(ErrorBody { error })).into_response();
    }

    Json(ChatResponse {
        session_id,
        message,
        tool_calls,
    })
    .into_response()
}

pub async fn chat_stream(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let session_id = req.session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let events = match state.engine.start_chat(&session_id, req.message, None) {
        Ok(rx) => rx,
        Err(e) => {
            let body = Sse::new(futures::stream::once(async move {
                Ok(Event::default().data(
                    serde_json::json!({"type": "error", "message": e.to_string()}).to_string(),
                ))
            }));
            return body.into_response();
        }
    };

    let session_id_for_stream = session_id.clone();
    let stream = ReceiverStream::new(events)
        .filter_map(move |event| to_sse_value(&event, &session_id_for_stream))
        .map(|value| Ok::<_, Infallible>(Event::default().data(value.to_string())));

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}
