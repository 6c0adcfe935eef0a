//! Standalone server binary for manual and e2e testing. Defaults to a mock
//! provider so it runs with no external API key; set `MOTE_DB` to pick the
//! SQLite file (default `mote.db`).

use std::sync::Arc;

use mote::provider::MockLlmClient;
use mote_serve::ServeConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let db_path = std::env::var("MOTE_DB").unwrap_or_else(|_| "mote.db".to_string());
    let provider = Arc::new(MockLlmClient::with_content(
        "this is a canned response from the test-server binary",
    ));
    let cfg = ServeConfig::minimal(db_path, provider);

    mote_serve::run_serve(None, cfg).await
}
