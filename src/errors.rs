use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::dispatch::DispatchError;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INTERNAL_ERROR: i32 = -32603;

/// Protocol-level failures, each carrying its JSON-RPC error code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("parse error: {message}")]
    Parse { message: String },
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("method not found: {method}")]
    MethodNotFound { method: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Parse { .. } => PARSE_ERROR,
            Self::InvalidRequest { .. } => INVALID_REQUEST,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// Message placed in the `error.message` field of the response envelope.
    pub fn rpc_message(&self) -> String {
        match self {
            Self::Parse { message } => format!("Parse error: {message}"),
            Self::InvalidRequest { message } => format!("Invalid Request: {message}"),
            Self::MethodNotFound { method } => format!("Method not found: {method}"),
            Self::Internal { message } => message.clone(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("result serialization failed: {err}"))
    }
}

/// Failures of the HTTP transport itself, as opposed to protocol errors
/// which always travel inside an HTTP 200 envelope.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed with transport error");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
