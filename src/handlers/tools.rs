//! REST form of a tool invocation.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
};
use serde_json::Value;

use crate::{
    error::AppError,
    middleware::auth::Principal,
    models::tool::ToolOutput,
    services::gateway::ToolCallError,
    state::AppState,
};

/// Invoke one tool.
///
/// # Endpoint
///
/// `POST /api/v1/tools/{tool}`
///
/// # Authentication
///
/// `Authorization: Bearer <api key or admin secret>`. API-key calls are
/// metered exactly like gateway calls; admin calls are not metered.
///
/// # Request Body
///
/// The tool's arguments, e.g. for `ask_stylus`:
/// ```json
/// { "question": "How do I declare storage?", "questionType": "general" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: `{"data": ..., "tokens_used": 120}`
/// - **Error (400)**: Unknown tool or invalid arguments
/// - **Error (401)**: Missing or invalid credential
/// - **Error (502)**: Tool backend failed
pub async fn call_tool(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(tool): Path<String>,
    body: Bytes,
) -> Result<Json<ToolOutput>, AppError> {
    let arguments = if body.is_empty() {
        None
    } else {
        Some(
            serde_json::from_slice::<Value>(&body)
                .map_err(|_| AppError::Validation("Request body must be JSON".to_string()))?,
        )
    };

    let output = state
        .gateway
        .call_tool(Some(tool), arguments, principal.key_id())
        .await
        .map_err(|e| match e {
            ToolCallError::InvalidParams(message) => AppError::Validation(message),
            failed @ ToolCallError::Failed(_) => AppError::Upstream(failed.to_string()),
        })?;

    Ok(Json(output))
}
