//! API key management for the signed-in user.
//!
//! - GET /api/keys - List non-revoked keys
//! - POST /api/keys - Create a key (plaintext shown once)
//! - DELETE /api/keys/{id} - Revoke a key

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::session::SessionUser,
    models::api_key::{CreateApiKeyRequest, CreatedApiKey},
    state::AppState,
};

/// List the user's keys, newest first.
///
/// # Endpoint
///
/// `GET /api/keys`
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "keys": [
///     {
///       "id": "550e8400-e29b-41d4-a716-446655440000",
///       "key_prefix": "arb_1a2b3c4d...",
///       "name": "ci",
///       "created_at": "2025-12-20T10:00:00Z",
///       "last_used_at": null,
///       "revoked_at": null
///     }
///   ]
/// }
/// ```
pub async fn list_keys(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
) -> Result<Json<Value>, AppError> {
    let keys = state.api_keys.list(user.id).await?;
    Ok(Json(json!({ "keys": keys })))
}

/// Create a key.
///
/// # Endpoint
///
/// `POST /api/keys`
///
/// # Request Body
///
/// ```json
/// { "name": "ci" }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the new key including its plaintext `key`,
///   which is never returned again
/// - **Error (400)**: Name longer than 100 characters
/// - **Error (401)**: No session
pub async fn create_key(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedApiKey>), AppError> {
    // The body is optional; `{}` and nothing at all both mean "no name"
    let request = if body.is_empty() {
        CreateApiKeyRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|_| AppError::Validation("Request body must be JSON".to_string()))?
    };
    let created = state.api_keys.create(user.id, request.name).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Revoke a key owned by the user.
///
/// # Endpoint
///
/// `DELETE /api/keys/{id}`
///
/// # Response
///
/// - **Success (200 OK)**: `{"success": true}`
/// - **Error (404)**: Unknown key, someone else's key, or already revoked
pub async fn revoke_key(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(key_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !state.api_keys.revoke(key_id, user.id).await? {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "success": true })))
}
