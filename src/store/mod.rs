//! Durable store interface.
//!
//! Every authentication decision is made from rows reached through these
//! traits, so any instance reaches the same decision from the same data.
//! Operations that decide a race (refresh rotation, code redemption, key
//! revocation, signing-key rotation) are single conditional statements or
//! single transactions in every implementation.
//!
//! - [`PgStore`]: PostgreSQL via sqlx, used in production
//! - [`MemoryStore`]: in-process implementation for tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    api_key::ApiKey,
    one_time_code::OneTimeCode,
    refresh_token::RefreshTokenRecord,
    signing_key::SigningKeyRecord,
    usage::{UsageLogEntry, UsageStats},
    user::User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors surfaced by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let unique_violation = err
            .as_database_error()
            .is_some_and(|db_err| db_err.is_unique_violation());

        if unique_violation {
            StoreError::Conflict(err.to_string())
        } else {
            StoreError::Database(err)
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Cheap round trip used by the health check.
    async fn ping(&self) -> StoreResult<()>;

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>>;

    /// Return the user for a normalized email, creating it if needed.
    ///
    /// Concurrent calls for the same email all observe the same row.
    async fn find_or_create_user(&self, email: &str, now: DateTime<Utc>) -> StoreResult<User>;
}

#[async_trait]
pub trait SigningKeyStore: Send + Sync {
    /// The active, non-revoked key whose expiry is after `valid_past`.
    async fn find_active_signing_key(
        &self,
        valid_past: DateTime<Utc>,
    ) -> StoreResult<Option<SigningKeyRecord>>;

    /// Deactivate every active key and insert `key` as the only active key,
    /// atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if a concurrent rotation won.
    async fn insert_active_signing_key(&self, key: &SigningKeyRecord) -> StoreResult<()>;

    /// Look up a non-revoked key by `kid`, active or not.
    async fn find_signing_key(&self, kid: &str) -> StoreResult<Option<SigningKeyRecord>>;

    /// Every key that can still verify tokens at `now`, newest first.
    async fn list_verification_keys(&self, now: DateTime<Utc>)
    -> StoreResult<Vec<SigningKeyRecord>>;

    /// Permanently revoke a key. Returns whether a row changed.
    async fn revoke_signing_key(&self, kid: &str, now: DateTime<Utc>) -> StoreResult<bool>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()>;

    /// Revoke the live record with this hash.
    ///
    /// A single conditional update: exactly one concurrent caller gets
    /// `Some(user_id)`, everyone else gets `None`.
    async fn consume_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>>;

    /// Revoke every live record of a user. Returns the number revoked.
    async fn revoke_user_refresh_tokens(&self, user_id: Uuid, now: DateTime<Utc>)
    -> StoreResult<u64>;
}

#[async_trait]
pub trait OneTimeCodeStore: Send + Sync {
    /// Number of codes created for `email` strictly after `since`.
    async fn count_codes_since(&self, email: &str, since: DateTime<Utc>) -> StoreResult<i64>;

    /// Insert `code` unless its email already has `max` codes created after
    /// `since`, marking every earlier unused code of the email as used.
    ///
    /// Count, invalidation and insert are serialized per email. Returns
    /// `false` without writing when the limit is reached.
    async fn issue_code(&self, code: &OneTimeCode, since: DateTime<Utc>, max: i64)
    -> StoreResult<bool>;

    /// Mark the newest unused, unexpired code matching `code_hash` as used.
    ///
    /// Returns whether a code was redeemed by this call.
    async fn redeem_code(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Delete codes that expired before `cutoff`. Returns the count.
    async fn delete_codes_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn insert_api_key(&self, key: &ApiKey) -> StoreResult<()>;

    /// Non-revoked keys of a user, newest first.
    async fn list_api_keys(&self, user_id: Uuid) -> StoreResult<Vec<ApiKey>>;

    /// Revoke a key owned by `user_id` that is not yet revoked.
    ///
    /// Returns whether a row changed.
    async fn revoke_api_key(
        &self,
        key_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Non-revoked key with this hash.
    async fn find_api_key_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>>;

    async fn touch_api_key(&self, key_id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn insert_usage(&self, entry: &UsageLogEntry) -> StoreResult<()>;

    /// Aggregate usage of every key owned by `user_id` since `since`.
    async fn usage_stats(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<UsageStats>;
}

/// Everything the service needs from durable state.
pub trait Store:
    UserStore + SigningKeyStore + RefreshTokenStore + OneTimeCodeStore + ApiKeyStore + UsageStore
{
}

impl<T> Store for T where
    T: UserStore + SigningKeyStore + RefreshTokenStore + OneTimeCodeStore + ApiKeyStore + UsageStore
{
}
