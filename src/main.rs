//! VoiceBridge Gateway - multi-tenant AI agent gateway

use tracing_subscriber::EnvFilter;
use voicebridge_gateway::server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    server::run_server().await.map_err(|e| e.into())
}
