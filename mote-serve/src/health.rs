//! `GET /api/v1/health` and `GET /api/v1/config`.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Snapshot of the orchestrator/queue/cache/compaction knobs, for
/// operational visibility. No secrets: same summary the engine logs to
/// stderr on startup.
pub async fn config(State(state): State<AppState>) -> Json<Value> {
    Json(state.engine.config.summary().to_json())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::app::{router, AppState, ServeConfig};
    use mote::provider::MockLlmClient;

    fn state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServeConfig::minimal(
            dir.path().join("mote.db"),
            Arc::new(MockLlmClient::with_content("hi")),
        );
        let state = AppState::new(cfg).unwrap();
        (dir, state)
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let (_dir, state) = state();
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "healthy");
    }

    #[tokio::test]
    async fn config_reports_the_engine_summary() {
        let (_dir, state) = state();
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/config")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(value.is_object());
    }
}
