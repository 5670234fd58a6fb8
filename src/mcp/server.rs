//! The central Model Context Protocol engine
//!
//! Decodes invocation envelopes and routes `initialize`, `ping`, `tools/list`
//! and `tools/call` against a registry view.

use rust_mcp_sdk::schema::{
    CallToolRequestParams, Implementation, InitializeResult, ListToolsResult, ServerCapabilities,
    ServerCapabilitiesTools,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::domain::registry::ToolRegistry;
use crate::errors::AppError;
use crate::mcp::rpc::{Correlation, JSON_RPC_VERSION};
use crate::mcp::transport::Notifier;

/// Newest first; the head is offered when the client asks for anything else.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub correlation: Correlation,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Invocation(InvocationRequest),
    /// A JSON-RPC message without an id; nothing is dispatched for it.
    Notification { method: String },
}

#[derive(Debug, Deserialize)]
struct JsonRpcEnvelope {
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ToolEnvelope {
    tool: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEnvelope {
    JsonRpc(JsonRpcEnvelope),
    Tool(ToolEnvelope),
}

pub fn parse_envelope(body: &[u8]) -> Result<Envelope, AppError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|err| AppError::invalid_body(err.to_string()))?;

    if !payload.is_object() {
        return Err(AppError::ParseError);
    }

    // An explicit `"id": null` still marks a request; only an absent id is a
    // notification.
    let id = payload.get("id").cloned();

    match serde_json::from_value(payload).map_err(|_| AppError::ParseError)? {
        RawEnvelope::JsonRpc(envelope) => {
            if envelope.jsonrpc != JSON_RPC_VERSION || envelope.method.trim().is_empty() {
                return Err(AppError::ParseError);
            }

            Ok(match id {
                Some(id) => Envelope::Invocation(InvocationRequest {
                    correlation: Correlation::JsonRpc(id),
                    method: envelope.method,
                    params: envelope.params,
                }),
                None => Envelope::Notification {
                    method: envelope.method,
                },
            })
        }
        RawEnvelope::Tool(envelope) => Ok(Envelope::Invocation(InvocationRequest {
            correlation: Correlation::Direct,
            method: "tools/call".to_string(),
            params: Some(json!({
                "name": envelope.tool,
                "arguments": envelope.params.unwrap_or_else(|| json!({})),
            })),
        })),
    }
}

pub async fn handle_request(
    registry: &ToolRegistry,
    method: &str,
    params: Option<Value>,
    notifier: &Notifier,
) -> Result<Value, AppError> {
    let tool = params
        .as_ref()
        .and_then(|value| value.get("name"))
        .and_then(Value::as_str)
        .filter(|_| method == "tools/call")
        .map(str::to_owned);

    let outcome = match method {
        "initialize" => initialize(params.as_ref()),
        "ping" => Ok(json!({})),
        "tools/list" => to_result_value(&ListToolsResult {
            meta: None,
            next_cursor: None,
            tools: registry.list(),
        }),
        "tools/call" => call_tool(registry, params, notifier).await,
        other => Err(AppError::method_not_found(other)),
    };

    info!(
        method = %method,
        tool = tool.as_deref().unwrap_or("-"),
        outcome = outcome.as_ref().map_or_else(AppError::code, |_| "success"),
        "mcp action audited"
    );

    outcome
}

fn initialize(params: Option<&Value>) -> Result<Value, AppError> {
    let protocol_version = negotiate_protocol_version(params)?;

    to_result_value(&InitializeResult {
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            logging: Some(serde_json::Map::new()),
            ..Default::default()
        },
        protocol_version: protocol_version.to_string(),
        instructions: None,
        meta: None,
    })
}

async fn call_tool(
    registry: &ToolRegistry,
    params: Option<Value>,
    notifier: &Notifier,
) -> Result<Value, AppError> {
    let Some(raw_params) = params else {
        return Err(AppError::invalid_params("tools/call requires params"));
    };

    let tool_call: CallToolRequestParams = serde_json::from_value(raw_params)
        .map_err(|err| AppError::invalid_params(err.to_string()))?;

    let result = registry
        .resolve(&tool_call.name)?
        .invoke(tool_call.arguments.unwrap_or_default(), notifier)
        .await?;

    to_result_value(&result)
}

fn to_result_value(result: &impl Serialize) -> Result<Value, AppError> {
    serde_json::to_value(result)
        .map_err(|err| AppError::internal(format!("result serialization failed: {err}")))
}

pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<&'static str, AppError> {
    let offered_version = params
        .and_then(|value| value.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            AppError::invalid_params("initialize params.protocolVersion is required")
        })?;

    Ok(SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|supported| *supported == offered_version)
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]))
}
