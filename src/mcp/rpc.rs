//! JSON-RPC framing and response translation
//!
//! Maps dispatch outcomes onto JSON-RPC result and fault frames, and fault
//! frames onto HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::errors::AppError;

pub const JSON_RPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i32 = -32700;
pub const PARSE_ERROR_MESSAGE: &str = "Parse error";
pub const INTERNAL_ERROR: i32 = -32603;
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
pub const METHOD_NOT_ALLOWED: i32 = -32000;
pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method not allowed.";

/// How the caller expects the successful result to be framed.
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    /// A JSON-RPC request; the result is wrapped and echoes the request id.
    JsonRpc(Value),
    /// A compact `{tool, params}` envelope; the tool result is returned bare.
    Direct,
}

/// The single terminal frame of an invocation.
#[derive(Debug)]
pub struct ResponseFrame {
    pub correlation: Correlation,
    pub outcome: Result<Value, AppError>,
}

impl ResponseFrame {
    pub fn new(correlation: Correlation, outcome: Result<Value, AppError>) -> Self {
        Self {
            correlation,
            outcome,
        }
    }

    pub fn is_fault(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn into_body(self) -> Result<Value, AppError> {
        let correlation = self.correlation;
        self.outcome.map(|result| match correlation {
            Correlation::JsonRpc(id) => json_rpc_result(id, result),
            Correlation::Direct => result,
        })
    }
}

impl IntoResponse for ResponseFrame {
    fn into_response(self) -> Response {
        match self.into_body() {
            Ok(body) => (StatusCode::OK, Json(body)).into_response(),
            Err(err) => err.into_response(),
        }
    }
}

pub fn json_rpc_result(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSON_RPC_VERSION,
        "id": id,
        "result": result
    })
}

/// Fault frames are never correlated: the id is always `null`.
pub fn json_rpc_fault(code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": JSON_RPC_VERSION,
        "error": {
            "code": code,
            "message": message
        },
        "id": null
    })
}

pub fn json_rpc_fault_with_data(code: i32, message: &str, data: Value) -> Value {
    json!({
        "jsonrpc": JSON_RPC_VERSION,
        "error": {
            "code": code,
            "message": message,
            "data": data
        },
        "id": null
    })
}

#[cfg(test)]
mod tests {
    use super::{Correlation, ResponseFrame};
    use crate::errors::AppError;
    use serde_json::json;

    #[test]
    fn json_rpc_result_echoes_request_id() {
        let frame = ResponseFrame::new(Correlation::JsonRpc(json!(7)), Ok(json!({"content": []})));

        let body = frame.into_body().expect("result body");
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], 7);
        assert_eq!(body["result"]["content"], json!([]));
    }

    #[test]
    fn direct_result_is_returned_bare() {
        let result = json!({"content": [{"type": "text", "text": "Hello, World!"}]});
        let frame = ResponseFrame::new(Correlation::Direct, Ok(result.clone()));

        assert_eq!(frame.into_body().expect("result body"), result);
    }

    #[test]
    fn fault_outcome_passes_through() {
        let frame = ResponseFrame::new(Correlation::Direct, Err(AppError::tool_not_found("x")));

        assert!(frame.is_fault());
        let error = frame.into_body().expect_err("fault");
        assert!(matches!(error, AppError::ToolNotFound { .. }));
    }
}
