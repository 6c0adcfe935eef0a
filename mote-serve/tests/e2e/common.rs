//! Shared helpers for the e2e suite: spin up a real server on a random port
//! against a mock provider and talk to it over a real WebSocket connection.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mote::provider::MockLlmClient;
use mote_serve::ServeConfig;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

/// Binds to a random port, spawns the server against a mock provider, and
/// returns the ws url plus the listener's join handle (abort it when done;
/// there is no "exit after first connection" mode to wait out).
pub async fn spawn_server(
    reply: &str,
) -> (
    String,
    tempfile::TempDir,
    tokio::task::JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>,
) {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("ws://{}/ws", addr);
    let cfg = ServeConfig::minimal(
        dir.path().join("mote.db"),
        Arc::new(MockLlmClient::with_content(reply)),
    );
    let handle = tokio::spawn(mote_serve::run_serve_on_listener(listener, cfg));
    (url, dir, handle)
}

/// Like [`spawn_server`], but the caller supplies a fully-built `ServeConfig`
/// (e.g. with tools registered) instead of getting `ServeConfig::minimal`.
pub async fn spawn_server_with_config(
    cfg: ServeConfig,
) -> (
    String,
    tokio::task::JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("ws://{}/ws", addr);
    let handle = tokio::spawn(mote_serve::run_serve_on_listener(listener, cfg));
    (url, handle)
}

/// Reads frames off `read` until `predicate` matches one, with an overall
/// timeout. Panics on timeout or stream end so failures show up as a single
/// clear assertion rather than a hang.
pub async fn recv_until<R>(
    read: &mut R,
    predicate: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value
where
    R: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let deadline = Duration::from_secs(10);
    loop {
        let msg = timeout(deadline, read.next())
            .await
            .expect("timed out waiting for a matching frame")
            .expect("stream ended")
            .expect("ws error");
        let Message::Text(text) = msg else { continue };
        let value: serde_json::Value = serde_json::from_str(&text).expect("frame is valid json");
        if predicate(&value) {
            return value;
        }
    }
}

pub async fn send_json<W>(write: &mut W, value: serde_json::Value)
where
    W: SinkExt<Message> + Unpin,
{
    let _ = write.send(Message::Text(value.to_string())).await;
}
