//! `tenax serve`: the HTTP invocation endpoint.
//!
//! Exposes the runtime contract the hosting platform expects:
//! - `POST /invocations` runs one agent invocation
//! - `GET /ping` is the health check

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use std::sync::Arc;
use tenax_agent::{AgentLoop, InvocationRequest, InvocationResponse, handle_invocation};
use tenax_config::AppConfig;
use tracing::info;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let agent = Arc::new(super::build_agent(&config)?);

    let port = port_override.unwrap_or(config.server.port);
    let addr = format!("{}:{}", config.server.host, port);

    let app = build_router(agent);

    info!(addr = %addr, "Starting invocation endpoint");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the Axum router for the invocation endpoint.
pub fn build_router(agent: Arc<AgentLoop>) -> Router {
    Router::new()
        .route("/ping", get(ping_handler))
        .route("/invocations", post(invocations_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(agent)
}

async fn ping_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "Healthy" }))
}

async fn invocations_handler(
    State(agent): State<Arc<AgentLoop>>,
    Json(payload): Json<InvocationRequest>,
) -> Json<InvocationResponse> {
    Json(handle_invocation(&agent, payload).await)
}
