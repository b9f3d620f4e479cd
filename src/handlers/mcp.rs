//! Protocol gateway endpoint.
//!
//! `POST /mcp` takes a JSON-RPC request or batch and requires an API key;
//! the admin secret is refused here so every call is metered against a real
//! key. `GET /mcp` describes the server.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::{
    error::AppError,
    middleware::auth::Principal,
    models::{
        jsonrpc::{JsonRpcResponse, UNAUTHORIZED},
        tool::TOOL_NAMES,
    },
    services::gateway::{GatewayReply, SERVER_NAME, SERVER_VERSION},
    state::AppState,
};

/// Handle a JSON-RPC request or batch.
///
/// # Endpoint
///
/// `POST /mcp`
///
/// # Request Body
///
/// ```json
/// {
///   "jsonrpc": "2.0",
///   "id": 1,
///   "method": "tools/call",
///   "params": { "name": "ask_stylus", "arguments": { "question": "..." } }
/// }
/// ```
///
/// # Response
///
/// - **200 OK**: JSON-RPC response (or array of responses for a batch)
/// - **400 Bad Request**: Body is not JSON (`-32700`)
/// - **401 Unauthorized**: Missing/invalid API key or admin secret (`-32001`)
pub async fn handle_rpc(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorization = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok());

    let key_id = match state.authenticator.authenticate(authorization).await {
        Ok(Principal::ApiKey { key_id, .. }) => key_id,
        Ok(Principal::Admin) | Err(AppError::Unauthorized) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(JsonRpcResponse::failure(Value::Null, UNAUTHORIZED, "Unauthorized")),
            )
                .into_response();
        }
        Err(e) => return e.into_response(),
    };

    match state.gateway.handle(&body, key_id).await {
        GatewayReply::Single(response) => Json(response).into_response(),
        GatewayReply::Batch(responses) => Json(responses).into_response(),
        GatewayReply::ParseError(response) => {
            (StatusCode::BAD_REQUEST, Json(response)).into_response()
        }
    }
}

/// Describe the gateway.
///
/// # Endpoint
///
/// `GET /mcp`
///
/// # Response (200 OK)
///
/// ```json
/// { "name": "arbbuilder", "version": "1.0.0", "status": "ok", "tools": 5 }
/// ```
pub async fn server_info() -> Json<Value> {
    Json(json!({
        "name": SERVER_NAME,
        "version": SERVER_VERSION,
        "status": "ok",
        "tools": TOOL_NAMES.len(),
    }))
}
