//! HTTP transport — the same JSON-RPC envelope carried over `POST /mcp`.
//!
//! Endpoints:
//!   POST /mcp        JSON-RPC request → JSON-RPC response (204 for notifications)
//!   GET  /health     liveness probe

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

use super::transport::{handle_message, RpcError, RpcMessage, RpcResponse, MCP_PARSE_ERROR};
use super::DispatchSurface;

#[derive(Clone)]
struct HttpState {
    surface: Arc<DispatchSurface>,
    server_name: Arc<String>,
}

/// Serve the MCP surface over HTTP until the process exits.
pub async fn serve_http(
    surface: Arc<DispatchSurface>,
    server_name: &str,
    host: &str,
    port: u16,
) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;

    let state = HttpState {
        surface,
        server_name: Arc::new(server_name.to_string()),
    };

    let router = Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/health", get(health))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state);

    info!(server = server_name, "serving MCP on http://{addr}/mcp");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn handle_mcp(State(state): State<HttpState>, body: String) -> impl IntoResponse {
    let response = match serde_json::from_str::<RpcMessage>(&body) {
        Ok(msg) => handle_message(&state.surface, &state.server_name, msg).await,
        Err(e) => Some(RpcResponse::err(
            Value::Null,
            RpcError::new(MCP_PARSE_ERROR, format!("parse error: {e}")),
        )),
    };

    match response {
        Some(r) => (StatusCode::OK, Json(serde_json::to_value(&r).unwrap_or(Value::Null))),
        // Notification — acknowledged, nothing to say.
        None => (StatusCode::NO_CONTENT, Json(Value::Null)),
    }
}

async fn health(State(state): State<HttpState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "server": *state.server_name,
        "operations": state.surface.operation_count(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
