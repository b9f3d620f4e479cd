//! User model.
//!
//! Users are created lazily the first time an email address completes a
//! one-time-code login. The email is the natural key and is always stored
//! lowercase.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents a user record from the database.
///
/// # Database Table
///
/// Maps to the `users` table; `email` carries a unique constraint.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public view of a user returned by the session endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
        }
    }
}

/// `GET /api/auth/session` body.
///
/// ```json
/// { "user": { "id": "...", "email": "user@example.com", "name": null }, "refreshed": true }
/// ```
///
/// `user` is `null` when there is no valid session; `refreshed` only appears
/// when the session was renewed from the refresh cookie.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub user: Option<UserResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refreshed: Option<bool>,
}

impl SessionResponse {
    pub fn anonymous() -> Self {
        Self {
            user: None,
            refreshed: None,
        }
    }
}

/// Normalize an email address for storage and lookup.
///
/// Trims surrounding whitespace and lowercases the address so that
/// `User@Example.com` and `user@example.com` name the same user.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal shape check for an email address.
///
/// Delivery is the real validation; this only rejects input that can't be
/// an address at all.
pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }

    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}
