//! Administrative endpoints (admin secret only) and public key
//! distribution.
//!
//! - GET /.well-known/jwks.json - Public verification keys
//! - POST /api/admin/keys/rotate - Force a signing key rotation
//! - DELETE /api/admin/keys/{kid} - Revoke a signing key
//! - POST /api/admin/cleanup - Delete long-expired one-time codes

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::{Value, json};

use crate::{
    error::AppError,
    middleware::auth::{Principal, require_admin},
    models::signing_key::{JwkSet, SigningKeyResponse},
    state::AppState,
};

/// Public keys that can verify currently valid tokens.
///
/// # Endpoint
///
/// `GET /.well-known/jwks.json`
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "keys": [
///     { "kty": "OKP", "crv": "Ed25519", "x": "...", "kid": "key-1a2b3c4d5e6f7a8b", "use": "sig", "alg": "EdDSA" }
///   ]
/// }
/// ```
pub async fn jwks(State(state): State<AppState>) -> Result<Json<JwkSet>, AppError> {
    Ok(Json(state.keys.jwks().await?))
}

/// Rotate the signing key.
///
/// # Endpoint
///
/// `POST /api/admin/keys/rotate`
///
/// Tokens signed by the previous key keep verifying until that key expires.
pub async fn rotate_signing_key(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<SigningKeyResponse>, AppError> {
    require_admin(&principal)?;
    let key = state.keys.rotate().await?;
    Ok(Json(SigningKeyResponse::from(&key)))
}

/// Revoke a signing key; every token it signed stops verifying.
///
/// # Endpoint
///
/// `DELETE /api/admin/keys/{kid}`
///
/// # Response
///
/// - **Success (200 OK)**: `{"success": true}`
/// - **Error (404)**: Unknown or already revoked kid
pub async fn revoke_signing_key(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(kid): Path<String>,
) -> Result<Json<Value>, AppError> {
    require_admin(&principal)?;
    if !state.keys.revoke(&kid).await? {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "success": true })))
}

/// Delete one-time codes that expired more than an hour ago.
///
/// # Endpoint
///
/// `POST /api/admin/cleanup`
///
/// # Response (200 OK)
///
/// ```json
/// { "deleted_codes": 17 }
/// ```
pub async fn cleanup(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Value>, AppError> {
    require_admin(&principal)?;
    let deleted = state.codes.cleanup_expired().await?;
    Ok(Json(json!({ "deleted_codes": deleted })))
}
