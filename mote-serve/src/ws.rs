//! WebSocket connection lifecycle: upgrade, per-client forwarding task, and
//! inbound frame dispatch. Grounded on the teacher's copied
//! `connection.rs::handle_socket`/`handle_request_and_send` split (recv loop
//! over the raw text, dispatch by request variant, send the response back)
//! generalized from one request-per-reply to the hub's subscribe/broadcast
//! model since a single connection may now be streaming several sessions'
//! events concurrently.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde_json::json;

use crate::app::AppState;
use crate::frame::{to_ws_frame, ClientFrame};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (client_id, mut outbound) = state.hub.register();

    let forward = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let text = serde_json::to_string(&frame).unwrap_or_else(|_| "{}".to_string());
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(t) => t,
            Message::Binary(b) => String::from_utf8_lossy(&b).into_owned(),
            Message::Close(_) => break,
            _ => continue,
        };
        handle_frame(&state, client_id, &text).await;
    }

    state.hub.unregister(client_id);
    forward.abort();
}

async fn handle_frame(state: &AppState, client_id: u64, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            state
                .hub
                .send_to(client_id, json!({"type": "error", "message": format!("parse error: {e}")}));
            return;
        }
    };

    match frame {
        ClientFrame::Subscribe { session } => {
            state.hub.subscribe(&session, client_id);
        }
        ClientFrame::Unsubscribe { session } => {
            state.hub.unsubscribe(&session, client_id);
        }
        ClientFrame::Ping { request_id } => {
            state
                .hub
                .send_to(client_id, json!({"type": "pong", "request_id": request_id}));
        }
        ClientFrame::ApprovalResponse { request_id, approved } => {
            let resolved = state.hub.resolve_approval(&request_id, approved);
            state.hub.send_to(
                client_id,
                json!({
                    "type": "approval_resolved",
                    "request_id": request_id,
                    "approved": approved,
                    "resolved": resolved,
                }),
            );
        }
        ClientFrame::Chat { session, message } => {
            state.hub.subscribe(&session, client_id);
            match state.engine.start_chat(&session, message, None) {
                Ok(mut events) => {
                    let hub = state.hub.clone();
                    let session_for_task = session.clone();
                    tokio::spawn(async move {
                        while let Some(event) = events.recv().await {
                            hub.broadcast_session(&session_for_task, to_ws_frame(&event, &session_for_task));
                        }
                    });
                }
                Err(e) => {
                    state
                        .hub
                        .send_to(client_id, json!({"type": "error", "session": session, "message": e.to_string()}));
                }
            }
        }
        ClientFrame::PdaRun { session, agent, message, resume } => {
            state.hub.subscribe(&session, client_id);
            match state.engine.start_pda(&session, &agent, message, resume) {
                Ok(mut events) => {
                    let hub = state.hub.clone();
                    let session_for_task = session.clone();
                    tokio::spawn(async move {
                        while let Some(event) = events.recv().await {
                            hub.broadcast_session(&session_for_task, to_ws_frame(&event, &session_for_task));
                        }
                    });
                }
                Err(e) => {
                    state
                        .hub
                        .send_to(client_id, json!({"type": "error", "session": session, "message": e.to_string()}));
                }
            }
        }
    }
}
