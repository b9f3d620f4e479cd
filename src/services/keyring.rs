//! Signing-key store.
//!
//! Tokens name the key that signed them by `kid`, so verification never
//! depends on which key is currently active. Rotation only changes which
//! row new tokens are signed with.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::AppError;
use crate::models::signing_key::{JwkSet, SigningKeyRecord};
use crate::services::token_service::REFRESH_TOKEN_TTL_SECS;
use crate::store::{Store, StoreError};

/// How long a new signing key stays valid.
pub const KEY_VALIDITY_DAYS: i64 = 90;

/// Access to signing keys for the token engine and the admin endpoints.
#[derive(Clone)]
pub struct KeyRing {
    store: Arc<dyn Store>,
}

impl KeyRing {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The key to sign with right now, rotating one in if none qualifies.
    pub async fn active_key(&self) -> Result<SigningKeyRecord, AppError> {
        self.active_key_at(Utc::now()).await
    }

    /// The key to sign with at `now`.
    ///
    /// A key only qualifies while it outlives a refresh token signed at
    /// `now`, so no token is ever issued under a key that expires first.
    pub async fn active_key_at(&self, now: DateTime<Utc>) -> Result<SigningKeyRecord, AppError> {
        let valid_past = now + Duration::seconds(REFRESH_TOKEN_TTL_SECS);

        if let Some(key) = self.store.find_active_signing_key(valid_past).await? {
            return Ok(key);
        }

        match self.rotate_at(now).await {
            Ok(key) => Ok(key),
            // Another instance rotated at the same moment; use its key
            Err(AppError::Store(StoreError::Conflict(_))) => self
                .store
                .find_active_signing_key(valid_past)
                .await?
                .ok_or_else(|| AppError::Internal("no signing key after rotation".to_string())),
            Err(e) => Err(e),
        }
    }

    /// Generate a new keypair and make it the only active key.
    pub async fn rotate(&self) -> Result<SigningKeyRecord, AppError> {
        self.rotate_at(Utc::now()).await
    }

    pub async fn rotate_at(&self, now: DateTime<Utc>) -> Result<SigningKeyRecord, AppError> {
        let key = SigningKeyRecord::generate(now, now + Duration::days(KEY_VALIDITY_DAYS));
        self.store.insert_active_signing_key(&key).await?;

        tracing::info!(kid = %key.kid, "Rotated signing key");
        Ok(key)
    }

    /// Key named by a token header, if it may still verify at `now`.
    ///
    /// Lookup failures collapse to `None`: an unknown key and an unreachable
    /// store both mean "cannot verify".
    pub async fn verification_key(&self, kid: &str, now: DateTime<Utc>) -> Option<SigningKeyRecord> {
        match self.store.find_signing_key(kid).await {
            Ok(Some(key)) if key.can_verify_at(now) => Some(key),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Signing key lookup failed: {}", e);
                None
            }
        }
    }

    /// Public keys that can currently verify tokens.
    pub async fn jwks(&self) -> Result<JwkSet, AppError> {
        let keys = self.store.list_verification_keys(Utc::now()).await?;
        Ok(JwkSet {
            keys: keys.iter().map(SigningKeyRecord::to_jwk).collect(),
        })
    }

    /// Permanently revoke a key; tokens it signed stop verifying.
    pub async fn revoke(&self, kid: &str) -> Result<bool, AppError> {
        let revoked = self.store.revoke_signing_key(kid, Utc::now()).await?;
        if revoked {
            tracing::warn!(kid = %kid, "Revoked signing key");
        }
        Ok(revoked)
    }
}
