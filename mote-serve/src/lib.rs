//! HTTP/SSE and WebSocket transport for the mote agent runtime (axum).
//!
//! Listens on `http://127.0.0.1:8080` by default. Implements `/api/v1/health`,
//! `/api/v1/chat`, `/api/v1/chat/stream` (SSE), `/api/v1/config`, and `/ws`
//! against the core engine; every other route §6 names is wired to a 501
//! stub (see [`stubs`]).
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`], [`ServeConfig`].
//!
//! Unlike the teacher's single-purpose WS listener, this server fronts both
//! HTTP and WebSocket traffic on one listener and has no "exit after the
//! first connection" test mode — tests that need deterministic shutdown
//! hold the `JoinHandle` `run_serve_on_listener` is spawned on and abort it.

mod app;
mod chat;
mod frame;
mod health;
mod hub;
mod stubs;
mod ws;

use tokio::net::TcpListener;
use tracing::info;

pub use app::{AppState, Engine, NoSkills, ServeConfig};
pub use hub::Hub;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Runs the server on an existing listener. Used by tests: bind to
/// `127.0.0.1:0`, then pass the listener in and read back its assigned port.
pub async fn run_serve_on_listener(
    listener: TcpListener,
    cfg: ServeConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("mote-serve listening on http://{}", addr);

    let state = AppState::new(cfg)?;
    let app = app::router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Runs the server. Listens on `addr` (default `127.0.0.1:8080`).
pub async fn run_serve(
    addr: Option<&str>,
    cfg: ServeConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or(DEFAULT_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, cfg).await
}
