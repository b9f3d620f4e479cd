//! Liveness endpoint.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::AppError,
    services::gateway::{SERVER_NAME, SERVER_VERSION},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,

    /// Keys currently published in the JWKS
    pub signing_keys: usize,

    pub timestamp: DateTime<Utc>,
}

/// Report whether the store answers.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "healthy",
///   "service": "arbbuilder",
///   "version": "1.0.0",
///   "signing_keys": 1,
///   "timestamp": "2025-12-21T19:00:00Z"
/// }
/// ```
///
/// A store failure yields the standard 500 error body.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    state.store.ping().await?;
    let jwks = state.keys.jwks().await?;

    Ok(Json(HealthResponse {
        status: "healthy",
        service: SERVER_NAME,
        version: SERVER_VERSION,
        signing_keys: jwks.keys.len(),
        timestamp: Utc::now(),
    }))
}
