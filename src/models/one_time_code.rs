//! One-time login code models and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a one-time code record from the database.
///
/// # Database Table
///
/// Maps to the `otp_codes` table. Only an HMAC of the code is stored;
/// the plaintext leaves the service once, in the email.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OneTimeCode {
    pub id: Uuid,
    pub email: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl OneTimeCode {
    /// Whether this code can still be redeemed at `now`.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

/// A freshly issued code, before delivery.
///
/// Holds the plaintext, so it must never be logged or persisted.
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Request body for `POST /api/auth/send-code`.
///
/// ```json
/// { "email": "user@example.com", "captcha_token": "0.abc..." }
/// ```
#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub email: Option<String>,
    #[serde(alias = "captchaToken")]
    pub captcha_token: Option<String>,
}

/// Response body for `POST /api/auth/send-code`.
#[derive(Debug, Serialize)]
pub struct SendCodeResponse {
    pub success: bool,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

/// Request body for `POST /api/auth/verify-code`.
///
/// ```json
/// { "email": "user@example.com", "code": "042917" }
/// ```
#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub email: Option<String>,
    pub code: Option<String>,
}

/// Whether `code` has the exact shape of an issued code (six ASCII digits).
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}
