//! Business logic services.
//!
//! Services hold the credential rules and talk to the store through the
//! [`Store`](crate::store::Store) traits. HTTP handlers stay thin and only
//! translate between requests and service calls.

use sha2::{Digest, Sha256};

pub mod api_key_service;
pub mod gateway;
pub mod keyring;
pub mod otc_service;
pub mod token_service;

/// Hex SHA-256 of a high-entropy secret (refresh tokens, API keys).
pub fn sha256_hex(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
