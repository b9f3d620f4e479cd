//! Usage statistics for the signed-in user.

use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    error::AppError,
    middleware::session::SessionUser,
    models::usage::{UsageQuery, UsageStats},
    state::AppState,
};

/// Aggregate tool usage across all of the user's keys.
///
/// # Endpoint
///
/// `GET /api/usage?days=30`
///
/// `days` defaults to 30 and is clamped to 1..=365. Keys revoked since still
/// count.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "total_calls": 12,
///   "total_tokens": 3400,
///   "calls_by_tool": { "ask_stylus": 9, "get_workflow": 3 },
///   "daily_usage": [{ "date": "2025-12-21", "calls": 4, "tokens": 1200 }]
/// }
/// ```
pub async fn get_usage(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageStats>, AppError> {
    let stats = state.api_keys.usage_stats(user.id, query.days).await?;
    Ok(Json(stats))
}
