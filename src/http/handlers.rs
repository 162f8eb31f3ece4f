//! Axum HTTP handlers for the web server
//!
//! Provides the unary JSON-RPC endpoint and general metadata endpoints.

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::dispatch::DispatchError;
use crate::errors::{AppError, TransportError};
use crate::mcp::rpc;
use crate::AppState;

pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub message_endpoint: &'static str,
    pub sse_endpoint: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        message_endpoint: "/message",
        sse_endpoint: "/sse",
    })
}

/// Hands the body to the host thread and waits for the encoded response.
pub async fn message_endpoint(State(state): State<AppState>, body: Body) -> Response {
    match handle_message(&state, body).await {
        Ok(response) => json_response(response),
        Err(err) => err.into_response(),
    }
}

async fn handle_message(state: &AppState, body: Body) -> Result<String, TransportError> {
    let bytes = to_bytes(body, MAX_BODY_BYTES).await?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let request_id = rpc::peek_id(&text);

    let router = state.router.clone();
    match state
        .dispatcher
        .dispatch(move || router.handle_message(&text))
        .await
    {
        Ok(response) => Ok(response),
        Err(DispatchError::TimedOut(timeout)) => {
            let err = AppError::internal(format!("Request timed out after {timeout:?}"));
            Ok(rpc::encode_error(
                request_id.as_ref(),
                err.code(),
                &err.rpc_message(),
            ))
        }
        Err(err) => Err(err.into()),
    }
}

fn json_response(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}
