use std::time::Instant;

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "scene_bridge_mcp=info,tower_http=warn";

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
/// Output goes to stderr so stdout stays free for a bridge process.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let installed = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();

    if installed.is_err() {
        debug!("tracing subscriber already installed");
    }
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let body_bytes = content_length(request.headers());
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();

    if is_event_stream(response.headers()) {
        // The body outlives this call; duration would only measure the handshake.
        info!(path = %path, status = status.as_u16(), "event stream opened");
        return response;
    }

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        body_bytes,
        duration_ms = started_at.elapsed().as_millis(),
        "request summary"
    );

    if status.is_server_error() {
        warn!(method = %method, path = %path, "request failed at transport level");
    }

    response
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"))
}
