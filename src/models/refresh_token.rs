//! Refresh token records.
//!
//! The refresh token itself is a signed, self-contained credential held by
//! the browser. The server only keeps a SHA-256 hash of it so that each
//! refresh token can be used exactly once.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents a refresh token record from the database.
///
/// # Database Table
///
/// Maps to the `refresh_tokens` table. `token_hash` is unique.
///
/// # Lifecycle
///
/// A record is live while `revoked_at` is NULL and `expires_at` is in the
/// future. Using the token revokes the record; there is no way back.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    /// Whether this record can still authorize a rotation at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}
