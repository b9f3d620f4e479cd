//! API Key model for programmatic authentication.
//!
//! API keys are long-lived bearer credentials. They are stored in the
//! database as SHA-256 hashes; the plaintext is shown exactly once, in the
//! response to the request that created it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Unique identifier (UUID)
/// - `user_id`: Owner of the key
/// - `key_hash`: SHA-256 hash of the actual API key
/// - `key_prefix`: display-safe truncation, e.g. `arb_1a2b3c4d...`
/// - `name`: optional label chosen by the owner
/// - `created_at`, `last_used_at`, `revoked_at`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,

    /// SHA-256 hash of the actual API key (64 hex characters)
    ///
    /// When a request comes in with "Bearer arb_...", we:
    /// 1. Hash the key with SHA-256
    /// 2. Look up this hash in the database
    /// 3. If found and not revoked, authenticate the request
    pub key_hash: String,

    pub key_prefix: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,

    /// Revocation is one-way: once set it is never cleared.
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Identity resolved from a valid API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiKeyIdentity {
    pub user_id: Uuid,
    pub key_id: Uuid,
}

/// Request body for creating a new API key.
///
/// ```json
/// { "name": "CI pipeline" }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct CreateApiKeyRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// Response body for API key listing. Never carries the secret or its hash.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyResponse {
    pub id: Uuid,
    pub key_prefix: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            key_prefix: key.key_prefix,
            name: key.name,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
            revoked_at: key.revoked_at,
        }
    }
}

/// Response returned once, when a key is created.
///
/// # JSON Example
///
/// ```json
/// {
///   "key": "arb_9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822c",
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "key_prefix": "arb_9f86d081...",
///   "name": "CI pipeline",
///   "created_at": "2025-12-20T10:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct CreatedApiKey {
    pub key: String,
    pub id: Uuid,
    pub key_prefix: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}
