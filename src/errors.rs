use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::mcp::rpc::{
    json_rpc_fault, json_rpc_fault_with_data, INTERNAL_ERROR, INTERNAL_ERROR_MESSAGE,
    METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_MESSAGE, PARSE_ERROR, PARSE_ERROR_MESSAGE,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("request body is not valid json: {message}")]
    InvalidBody { message: String },
    #[error("request body is not a recognised invocation envelope")]
    ParseError,
    #[error("invalid params: {message}")]
    InvalidParams { message: String },
    #[error("tool not found: {name}")]
    ToolNotFound { name: String },
    #[error("method not found: {method}")]
    MethodNotFound { method: String },
    #[error("internal error: {message}")]
    Internal { message: String },
    #[error("client disconnected")]
    ClientDisconnected,
}

impl AppError {
    pub fn invalid_body(message: impl Into<String>) -> Self {
        Self::InvalidBody {
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
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

    /// Stable machine-readable code carried in the fault's `data` member.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed => "method_not_allowed",
            Self::InvalidBody { .. } => "invalid_body",
            Self::ParseError => "parse_error",
            Self::InvalidParams { .. } => "invalid_params",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::Internal { .. } => "internal_error",
            Self::ClientDisconnected => "client_disconnected",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::ParseError => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Detail that is safe to hand back to the client.
    fn public_message(&self) -> String {
        match self {
            Self::Internal { .. } => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_fault(&self) -> serde_json::Value {
        match self {
            Self::MethodNotAllowed => json_rpc_fault(METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_MESSAGE),
            Self::ParseError => json_rpc_fault(PARSE_ERROR, PARSE_ERROR_MESSAGE),
            other => json_rpc_fault_with_data(
                INTERNAL_ERROR,
                INTERNAL_ERROR_MESSAGE,
                serde_json::json!({
                    "code": other.code(),
                    "message": other.public_message(),
                }),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal { message } => {
                tracing::error!(error = %message, "request failed with internal error");
            }
            Self::MethodNotAllowed | Self::ParseError => {}
            other => {
                tracing::warn!(code = other.code(), error = %other, "invocation rejected");
            }
        }

        (self.status(), Json(self.to_fault())).into_response()
    }
}
