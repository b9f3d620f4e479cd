//! Signing key records and their public JWK form.
//!
//! Keys are addressed by `kid`, never by "the current key". At most one row
//! is active (used for signing) at a time; rotated-out keys keep verifying
//! until they expire, and revoked keys never verify again.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use ed25519_dalek::{SECRET_KEY_LENGTH, SigningKey, VerifyingKey};
use serde::Serialize;
use uuid::Uuid;

/// Algorithm name written into token headers and key rows.
pub const SIGNING_ALGORITHM: &str = "EdDSA";

/// Represents a signing key record from the database.
///
/// # Database Table
///
/// Maps to the `jwt_keys` table. A partial unique index guarantees at most
/// one row with `is_active = true`.
#[derive(Clone, sqlx::FromRow)]
pub struct SigningKeyRecord {
    pub id: Uuid,

    /// Public identifier embedded in token headers.
    pub kid: String,

    /// Raw 32-byte Ed25519 secret key.
    pub private_key: Vec<u8>,

    /// Raw 32-byte Ed25519 public key.
    pub public_key: Vec<u8>,

    pub algorithm: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

// Key material stays out of debug output.
impl std::fmt::Debug for SigningKeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyRecord")
            .field("id", &self.id)
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("is_active", &self.is_active)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("revoked_at", &self.revoked_at)
            .finish_non_exhaustive()
    }
}

impl SigningKeyRecord {
    /// Generate a fresh active key valid until `expires_at`.
    pub fn generate(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        let secret: [u8; SECRET_KEY_LENGTH] = rand::random();
        let signing_key = SigningKey::from_bytes(&secret);
        let kid_suffix: [u8; 8] = rand::random();

        Self {
            id: Uuid::new_v4(),
            kid: format!("key-{}", hex::encode(kid_suffix)),
            private_key: signing_key.to_bytes().to_vec(),
            public_key: signing_key.verifying_key().to_bytes().to_vec(),
            algorithm: SIGNING_ALGORITHM.to_string(),
            is_active: true,
            created_at: now,
            expires_at: Some(expires_at),
            revoked_at: None,
        }
    }

    /// Whether tokens naming this key may still be verified at `now`.
    pub fn can_verify_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|exp| exp > now)
    }

    /// Decode the stored secret into a dalek signing key.
    ///
    /// Returns `None` when the stored bytes are not a 32-byte secret.
    pub fn signing_key(&self) -> Option<SigningKey> {
        let bytes: [u8; SECRET_KEY_LENGTH] = self.private_key.as_slice().try_into().ok()?;
        Some(SigningKey::from_bytes(&bytes))
    }

    /// Decode the stored public key.
    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        let bytes: [u8; 32] = self.public_key.as_slice().try_into().ok()?;
        VerifyingKey::from_bytes(&bytes).ok()
    }

    /// Public JWK for this key (OKP / Ed25519).
    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kty: "OKP",
            crv: "Ed25519",
            x: URL_SAFE_NO_PAD.encode(&self.public_key),
            kid: self.kid.clone(),
            key_use: "sig",
            alg: SIGNING_ALGORITHM,
        }
    }
}

/// One public key in a JWKS document.
#[derive(Debug, Clone, Serialize)]
pub struct Jwk {
    pub kty: &'static str,
    pub crv: &'static str,
    pub x: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub key_use: &'static str,
    pub alg: &'static str,
}

/// `GET /.well-known/jwks.json` body.
#[derive(Debug, Clone, Serialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Public view of a signing key for admin responses.
#[derive(Debug, Clone, Serialize)]
pub struct SigningKeyResponse {
    pub kid: String,
    pub algorithm: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&SigningKeyRecord> for SigningKeyResponse {
    fn from(key: &SigningKeyRecord) -> Self {
        Self {
            kid: key.kid.clone(),
            algorithm: key.algorithm.clone(),
            is_active: key.is_active,
            created_at: key.created_at,
            expires_at: key.expires_at,
        }
    }
}
