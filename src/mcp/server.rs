//! The central Model Context Protocol engine
//!
//! Decodes one JSON-RPC envelope, routes it by method name (capability
//! negotiation, tool listing and invocation, resource listing and reading,
//! liveness ping) and encodes the response. No state survives between
//! requests. Runs inside dispatched closures on the host thread.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use rust_mcp_sdk::schema::{
    CallToolResult, ContentBlock, Implementation, InitializeResult, ListResourcesResult,
    ProtocolVersion, ServerCapabilities, ServerCapabilitiesResources, ServerCapabilitiesTools,
    TextContent,
};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::dispatch::panic_message;
use crate::domain::resources::ResourceProvider;
use crate::errors::{AppError, PARSE_ERROR};
use crate::mcp::registry::ToolRegistry;
use crate::mcp::rpc::{self, RequestId};

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Clone)]
pub struct McpRouter {
    tools: Arc<ToolRegistry>,
    resources: Arc<dyn ResourceProvider>,
}

impl McpRouter {
    pub fn new(tools: Arc<ToolRegistry>, resources: Arc<dyn ResourceProvider>) -> Self {
        Self { tools, resources }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Decodes, routes and encodes one request body. Always returns a
    /// well-formed response envelope, even if routing panics.
    pub fn handle_message(&self, body: &str) -> String {
        match catch_unwind(AssertUnwindSafe(|| self.handle_request_text(body))) {
            Ok(response) => response,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "request handling panicked");
                rpc::encode_error(
                    rpc::peek_id(body).as_ref(),
                    PARSE_ERROR,
                    &AppError::parse(message).rpc_message(),
                )
            }
        }
    }

    fn handle_request_text(&self, body: &str) -> String {
        let request = match rpc::decode(body) {
            Ok(request) => request,
            Err(err) => return encode_app_error(None, &AppError::parse(err.to_string())),
        };
        let id = request.id.as_ref();

        let Some(method) = request
            .method
            .as_deref()
            .map(str::trim)
            .filter(|method| !method.is_empty())
        else {
            return encode_app_error(id, &AppError::invalid_request("missing method"));
        };

        let outcome = self.route(method, request.params.as_deref());

        info!(
            method = %method,
            params = %redact_audit_params(request.params.as_deref()),
            outcome = if outcome.is_ok() { "success" } else { "failure" },
            "mcp action audited"
        );

        match outcome {
            Ok(result) => rpc::encode_success(id, &result),
            Err(err) => encode_app_error(id, &err),
        }
    }

    pub fn route(&self, method: &str, params: Option<&str>) -> Result<Value, AppError> {
        match method {
            "initialize" => initialize_result(),
            "ping" => Ok(json!({ "pong": true })),
            "tools/list" => Ok(json!({ "tools": self.tools.list_definitions() })),
            "tools/call" => self.call_tool(params),
            "resources/list" => Ok(serde_json::to_value(ListResourcesResult {
                meta: None,
                next_cursor: None,
                resources: self.resources.list_resources(),
            })?),
            "resources/read" => self.read_resource(params),
            _ => Err(AppError::method_not_found(method)),
        }
    }

    fn call_tool(&self, params: Option<&str>) -> Result<Value, AppError> {
        let params = params.unwrap_or("{}");
        let name = rpc::find_field(params, "name")
            .and_then(rpc::string_value)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| AppError::invalid_request("tools/call requires params.name"))?;
        let arguments = tool_arguments(params);

        let result = self
            .tools
            .execute(&name, &arguments)
            .map_err(|err| AppError::internal(err.to_string()))?;

        Ok(serde_json::to_value(CallToolResult {
            content: vec![ContentBlock::from(TextContent::new(
                result.to_string(),
                None,
                None,
            ))],
            is_error: None,
            meta: None,
            structured_content: None,
        })?)
    }

    fn read_resource(&self, params: Option<&str>) -> Result<Value, AppError> {
        let uri = params
            .and_then(|params| rpc::find_field(params, "uri"))
            .and_then(rpc::string_value)
            .filter(|uri| !uri.trim().is_empty())
            .ok_or_else(|| AppError::invalid_request("resources/read requires params.uri"))?;

        let contents = self
            .resources
            .read_resource(&uri)
            .map_err(|err| AppError::internal(err.to_string()))?;
        Ok(serde_json::to_value(contents)?)
    }
}

/// Raw arguments JSON for a tool call; absent, `null` or empty reads as `{}`.
/// Arguments sent as a JSON-encoded string are unwrapped.
fn tool_arguments(params: &str) -> String {
    let arguments = match rpc::find_field(params, "arguments") {
        Some(raw) if raw.starts_with('"') => rpc::string_value(raw).unwrap_or_default(),
        Some(raw) if raw != "null" => raw.to_string(),
        _ => String::new(),
    };

    if arguments.trim().is_empty() {
        "{}".to_string()
    } else {
        arguments
    }
}

fn initialize_result() -> Result<Value, AppError> {
    let result = InitializeResult {
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
            resources: Some(ServerCapabilitiesResources {
                subscribe: Some(false),
                list_changed: Some(false),
            }),
            prompts: None,
            ..Default::default()
        },
        protocol_version: ProtocolVersion::V2024_11_05.into(),
        instructions: None,
        meta: None,
    };

    Ok(serde_json::to_value(result)?)
}

fn encode_app_error(id: Option<&RequestId>, err: &AppError) -> String {
    rpc::encode_error(id, err.code(), &err.rpc_message())
}

pub fn redact_audit_params(params: Option<&str>) -> Value {
    params
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .map(|value| redact_audit_value(&value))
        .unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
