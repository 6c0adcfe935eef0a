//! Stub handlers for every HTTP route §6 names but the core does not
//! implement: session/tool/memory/cron/MCP/agent/model/workspace CRUD. Each
//! one is wired up (so a client gets a clean 501 instead of a 404) but
//! carries no logic, since the collaborators behind them — `agents.yaml`
//! loading, MCP server management, a memory index — are out of scope (§1).

use axum::routing::{any, MethodRouter};
use axum::{http::StatusCode, Json, Router};
use serde_json::{json, Value};

use crate::app::AppState;

async fn not_implemented() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({"error": "not implemented"})),
    )
}

fn stub() -> MethodRouter<AppState> {
    any(not_implemented)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/sessions", stub())
        .route("/api/v1/sessions/:id", stub())
        .route("/api/v1/sessions/:id/messages", stub())
        .route("/api/v1/sessions/:id/model", stub())
        .route("/api/v1/tools", stub())
        .route("/api/v1/tools/:name", stub())
        .route("/api/v1/tools/:name/execute", stub())
        .route("/api/v1/memory", stub())
        .route("/api/v1/memory/search", stub())
        .route("/api/v1/memory/:id", stub())
        .route("/api/v1/memory/sync", stub())
        .route("/api/v1/memory/daily", stub())
        .route("/api/v1/memory/export", stub())
        .route("/api/v1/cron/jobs", stub())
        .route("/api/v1/cron/jobs/:name", stub())
        .route("/api/v1/cron/jobs/:name/run", stub())
        .route("/api/v1/mcp/servers", stub())
        .route("/api/v1/mcp/tools", stub())
        .route("/api/v1/mcp/tools/import", stub())
        .route("/api/v1/agents", stub())
        .route("/api/v1/agents/reload", stub())
        .route("/api/v1/agents/validate-dir", stub())
        .route("/api/v1/models", stub())
        .route("/api/v1/models/current", stub())
        .route("/api/v1/settings/models", stub())
        .route("/api/v1/workspaces", stub())
        .route("/api/v1/workspaces/:session", stub())
        .route("/api/v1/workspaces/:session/files", stub())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::app::{router, AppState, ServeConfig};
    use mote::provider::MockLlmClient;

    #[tokio::test]
    async fn an_out_of_scope_route_returns_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServeConfig::minimal(
            dir.path().join("mote.db"),
            Arc::new(MockLlmClient::with_content("hi")),
        );
        let state = AppState::new(cfg).unwrap();
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/tools")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }
}
