//! Session token wire format.
//!
//! A session token is `base64url(header) "." base64url(claims) "."
//! base64url(signature)`, unpadded, signed with Ed25519 over the first two
//! segments.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed issuer written into and required from every token.
pub const TOKEN_ISSUER: &str = "arbbuilder";

/// Fixed audience written into and required from every token.
pub const TOKEN_AUDIENCE: &str = "arbbuilder-web";

/// Which slot a token may be used in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Token header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

/// Token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id.
    pub sub: Uuid,
    pub email: String,
    /// Issued at (seconds since epoch).
    pub iat: i64,
    /// Expiration time (seconds since epoch).
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    /// Random token id so two tokens minted in the same second differ.
    pub jti: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

/// Identity a token is minted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub email: String,
}

/// Access and refresh token issued together.
#[derive(Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenPair { .. }")
    }
}
