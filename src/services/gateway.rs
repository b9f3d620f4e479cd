//! JSON-RPC protocol gateway for tool calls.
//!
//! Accepts one request object or a batch. Batch items run concurrently and
//! fail independently. Every `tools/call` writes exactly one usage row
//! against the calling API key, whether it succeeds or not.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::clients::tools::{ToolBackend, ToolError};
use crate::models::{
    jsonrpc::{
        INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JsonRpcRequest, JsonRpcResponse,
        METHOD_NOT_FOUND, PARSE_ERROR, ToolCallParams,
    },
    tool::{ToolCall, ToolOutput, catalog},
    usage::NewUsageEntry,
};
use crate::services::api_key_service::ApiKeyService;

pub const SERVER_NAME: &str = "arbbuilder";
pub const SERVER_VERSION: &str = "1.0.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Tool name recorded for calls that never named one.
pub const UNKNOWN_TOOL: &str = "unknown";

/// What to send back for one POST body.
#[derive(Debug)]
pub enum GatewayReply {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
    /// Body was not JSON at all; answered with HTTP 400.
    ParseError(JsonRpcResponse),
}

/// Why a tool call produced no output.
#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    /// Missing name, unknown tool or bad arguments.
    #[error("{0}")]
    InvalidParams(String),

    /// The backend failed; details are in the logs and the usage row.
    #[error("Tool execution failed: {0}")]
    Failed(&'static str),
}

#[derive(Clone)]
pub struct Gateway {
    tools: Arc<dyn ToolBackend>,
    api_keys: ApiKeyService,
}

impl Gateway {
    pub fn new(tools: Arc<dyn ToolBackend>, api_keys: ApiKeyService) -> Self {
        Self { tools, api_keys }
    }

    /// Handle a raw request body on behalf of API key `key_id`.
    pub async fn handle(&self, body: &[u8], key_id: Uuid) -> GatewayReply {
        let payload: Value = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(_) => {
                return GatewayReply::ParseError(JsonRpcResponse::failure(
                    Value::Null,
                    PARSE_ERROR,
                    "Parse error",
                ));
            }
        };

        match payload {
            Value::Array(items) if items.is_empty() => GatewayReply::Single(
                JsonRpcResponse::failure(Value::Null, INVALID_REQUEST, "Invalid Request"),
            ),
            Value::Array(items) => {
                let responses =
                    join_all(items.into_iter().map(|item| self.process(item, key_id))).await;
                GatewayReply::Batch(responses)
            }
            single => GatewayReply::Single(self.process(single, key_id).await),
        }
    }

    /// Process one request object.
    pub async fn process(&self, value: Value, key_id: Uuid) -> JsonRpcResponse {
        let id_hint = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(_) => return JsonRpcResponse::failure(id_hint, INVALID_REQUEST, "Invalid Request"),
        };
        if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
            return JsonRpcResponse::failure(id_hint, INVALID_REQUEST, "Invalid Request");
        }

        let id = request.id.unwrap_or(Value::Null);
        match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": SERVER_VERSION,
                    },
                    "capabilities": {
                        "tools": {}
                    }
                }),
            ),
            "initialized" | "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": catalog() })),
            "tools/call" => self.tools_call(id, request.params, key_id).await,
            other => JsonRpcResponse::failure(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        }
    }

    async fn tools_call(&self, id: Value, params: Option<Value>, key_id: Uuid) -> JsonRpcResponse {
        let params = match params {
            None => ToolCallParams::default(),
            Some(value) => match serde_json::from_value::<ToolCallParams>(value) {
                Ok(params) => params,
                Err(_) => {
                    self.record_rejected(Some(key_id), UNKNOWN_TOOL, "Invalid params")
                        .await;
                    return JsonRpcResponse::failure(id, INVALID_PARAMS, "Invalid params");
                }
            },
        };

        match self
            .call_tool(params.name, params.arguments, Some(key_id))
            .await
        {
            Ok(output) => JsonRpcResponse::success(
                id,
                json!({
                    "content": [{ "type": "text", "text": output.to_text() }]
                }),
            ),
            Err(e @ ToolCallError::InvalidParams(_)) => {
                JsonRpcResponse::failure(id, INVALID_PARAMS, e.to_string())
            }
            Err(e @ ToolCallError::Failed(_)) => {
                JsonRpcResponse::failure(id, INTERNAL_ERROR, e.to_string())
            }
        }
    }

    /// Resolve, run and meter a named tool call.
    ///
    /// Exactly one usage row is written when `key_id` is set, including for
    /// calls rejected before reaching the backend. Calls without a name are
    /// recorded as [`UNKNOWN_TOOL`].
    pub async fn call_tool(
        &self,
        name: Option<String>,
        arguments: Option<Value>,
        key_id: Option<Uuid>,
    ) -> Result<ToolOutput, ToolCallError> {
        let Some(name) = name.filter(|name| !name.is_empty()) else {
            self.record_rejected(key_id, UNKNOWN_TOOL, "Missing tool name")
                .await;
            return Err(ToolCallError::InvalidParams("Missing tool name".to_string()));
        };

        let call = match ToolCall::parse(&name, arguments) {
            Ok(call) => call,
            Err(message) => {
                self.record_rejected(key_id, &name, &message).await;
                return Err(ToolCallError::InvalidParams(message));
            }
        };

        self.invoke(&call, key_id)
            .await
            .map_err(|_| ToolCallError::Failed(call.name()))
    }

    /// Run a validated tool call, timing it and metering it against
    /// `key_id` when there is one.
    pub async fn invoke(
        &self,
        call: &ToolCall,
        key_id: Option<Uuid>,
    ) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let result = self.tools.call(call).await;
        let latency_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        if let Err(e) = &result {
            tracing::warn!(tool = call.name(), latency_ms, "Tool call failed: {}", e);
        }

        if let Some(key_id) = key_id {
            let (tokens_used, error_message) = match &result {
                Ok(output) => (output.tokens_used.unwrap_or(0), None),
                Err(e) => (0, Some(e.to_string())),
            };
            self.api_keys
                .record_usage(NewUsageEntry {
                    api_key_id: key_id,
                    tool: call.name().to_string(),
                    tokens_used,
                    latency_ms,
                    success: result.is_ok(),
                    error_message,
                })
                .await;
        }

        result
    }

    async fn record_rejected(&self, key_id: Option<Uuid>, tool: &str, message: &str) {
        let Some(key_id) = key_id else {
            return;
        };
        self.api_keys
            .record_usage(NewUsageEntry {
                api_key_id: key_id,
                tool: tool.to_string(),
                tokens_used: 0,
                latency_ms: 0,
                success: false,
                error_message: Some(message.to_string()),
            })
            .await;
    }
}
