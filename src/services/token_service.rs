//! Token engine: minting, verifying and rotating session tokens.
//!
//! Access tokens live for 15 minutes, refresh tokens for 7 days. Every
//! refresh token issued is also recorded by hash so it can be used exactly
//! once.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    refresh_token::RefreshTokenRecord,
    signing_key::SIGNING_ALGORITHM,
    token::{
        TOKEN_AUDIENCE, TOKEN_ISSUER, TokenClaims, TokenHeader, TokenKind, TokenPair, TokenSubject,
    },
};
use crate::services::{keyring::KeyRing, sha256_hex};
use crate::store::Store;

/// Lifetime of an access token.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Lifetime of a refresh token.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

impl TokenKind {
    pub fn ttl_secs(self) -> i64 {
        match self {
            TokenKind::Access => ACCESS_TOKEN_TTL_SECS,
            TokenKind::Refresh => REFRESH_TOKEN_TTL_SECS,
        }
    }
}

#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn Store>,
    keys: KeyRing,
}

impl TokenService {
    pub fn new(store: Arc<dyn Store>, keys: KeyRing) -> Self {
        Self { store, keys }
    }

    /// Sign a token of `kind` for `subject` with the active key.
    pub async fn sign(&self, subject: &TokenSubject, kind: TokenKind) -> Result<String, AppError> {
        self.sign_at(subject, kind, Utc::now()).await
    }

    pub async fn sign_at(
        &self,
        subject: &TokenSubject,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let key = self.keys.active_key_at(now).await?;
        let signing_key = key
            .signing_key()
            .ok_or_else(|| AppError::Internal(format!("corrupt private key {}", key.kid)))?;

        let header = TokenHeader {
            alg: SIGNING_ALGORITHM.to_string(),
            typ: "JWT".to_string(),
            kid: key.kid.clone(),
        };
        let iat = now.timestamp();
        let claims = TokenClaims {
            sub: subject.user_id,
            email: subject.email.clone(),
            iat,
            exp: iat + kind.ttl_secs(),
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            jti: Uuid::new_v4().simple().to_string(),
            kind,
        };

        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);
        let signature = signing_key.sign(signing_input.as_bytes());

        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    /// Verify a token and return its claims.
    ///
    /// Every failure (bad shape, wrong algorithm, unknown or revoked key,
    /// bad signature, expiry, wrong issuer or audience) is reported the same
    /// way: `None`.
    pub async fn verify(&self, token: &str) -> Option<TokenClaims> {
        self.verify_at(token, Utc::now()).await
    }

    pub async fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Option<TokenClaims> {
        let mut segments = token.split('.');
        let (header_b64, claims_b64, signature_b64) =
            (segments.next()?, segments.next()?, segments.next()?);
        if segments.next().is_some() {
            return None;
        }

        let header: TokenHeader = decode_segment(header_b64)?;
        if header.alg != SIGNING_ALGORITHM {
            return None;
        }

        let key = self.keys.verification_key(&header.kid, now).await?;
        if key.algorithm != header.alg {
            return None;
        }
        let verifying_key = key.verifying_key()?;

        let signature_bytes = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
        let signature = Signature::from_slice(&signature_bytes).ok()?;
        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        verifying_key
            .verify_strict(signing_input.as_bytes(), &signature)
            .ok()?;

        let claims: TokenClaims = decode_segment(claims_b64)?;
        if claims.exp <= now.timestamp() || claims.iss != TOKEN_ISSUER || claims.aud != TOKEN_AUDIENCE
        {
            return None;
        }

        Some(claims)
    }

    /// Verify a token and additionally require its kind.
    pub async fn verify_kind(&self, token: &str, kind: TokenKind) -> Option<TokenClaims> {
        self.verify_kind_at(token, kind, Utc::now()).await
    }

    pub async fn verify_kind_at(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Option<TokenClaims> {
        self.verify_at(token, now)
            .await
            .filter(|claims| claims.kind == kind)
    }

    /// Mint an access/refresh pair and record the refresh token's hash.
    pub async fn create_pair(&self, subject: &TokenSubject) -> Result<TokenPair, AppError> {
        self.create_pair_at(subject, Utc::now()).await
    }

    pub async fn create_pair_at(
        &self,
        subject: &TokenSubject,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AppError> {
        let access_token = self.sign_at(subject, TokenKind::Access, now).await?;
        let refresh_token = self.sign_at(subject, TokenKind::Refresh, now).await?;

        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id: subject.user_id,
            token_hash: sha256_hex(&refresh_token),
            expires_at: now + Duration::seconds(REFRESH_TOKEN_TTL_SECS),
            revoked_at: None,
        };
        self.store.insert_refresh_token(&record).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Exchange a refresh token for a new pair, consuming the old one.
    ///
    /// Returns `Ok(None)` when the token is not a valid, live refresh token.
    /// Of two concurrent calls with the same token at most one succeeds.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Option<TokenPair>, AppError> {
        self.refresh_at(refresh_token, Utc::now()).await
    }

    pub async fn refresh_at(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenPair>, AppError> {
        let Some(claims) = self
            .verify_kind_at(refresh_token, TokenKind::Refresh, now)
            .await
        else {
            return Ok(None);
        };

        let consumed = self
            .store
            .consume_refresh_token(&sha256_hex(refresh_token), now)
            .await?;
        if consumed != Some(claims.sub) {
            tracing::debug!(user_id = %claims.sub, "Refresh token already used or revoked");
            return Ok(None);
        }

        let subject = TokenSubject {
            user_id: claims.sub,
            email: claims.email,
        };
        self.create_pair_at(&subject, now).await.map(Some)
    }

    /// Revoke every live refresh token of a user (logout).
    pub async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self
            .store
            .revoke_user_refresh_tokens(user_id, Utc::now())
            .await?;
        tracing::info!(user_id = %user_id, revoked, "Revoked refresh tokens");
        Ok(revoked)
    }
}

fn encode_segment<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| AppError::Internal(format!("token serialization: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Option<T> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> (TokenService, KeyRing) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let keys = KeyRing::new(Arc::clone(&store));
        (TokenService::new(store, keys.clone()), keys)
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: Uuid::new_v4(),
            email: "dev@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn signed_token_verifies_with_claims() {
        let (tokens, _) = service();
        let subject = subject();

        let token = tokens.sign(&subject, TokenKind::Access).await.unwrap();
        let claims = tokens.verify(&token).await.unwrap();

        assert_eq!(claims.sub, subject.user_id);
        assert_eq!(claims.email, subject.email);
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_TTL_SECS);
        assert_eq!(claims.iss, TOKEN_ISSUER);
        assert_eq!(claims.aud, TOKEN_AUDIENCE);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let (tokens, _) = service();
        let now = Utc::now();
        let token = tokens
            .sign_at(&subject(), TokenKind::Access, now)
            .await
            .unwrap();

        assert!(tokens.verify_at(&token, now + Duration::minutes(14)).await.is_some());
        assert!(tokens.verify_at(&token, now + Duration::minutes(15)).await.is_none());
    }

    #[tokio::test]
    async fn tampered_payload_is_rejected() {
        let (tokens, _) = service();
        let token = tokens.sign(&subject(), TokenKind::Access).await.unwrap();

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_claims = {
            let mut claims: TokenClaims = decode_segment(parts[1]).unwrap();
            claims.email = "attacker@example.com".to_string();
            encode_segment(&claims).unwrap()
        };
        parts[1] = &forged_claims;

        assert!(tokens.verify(&parts.join(".")).await.is_none());
    }

    #[tokio::test]
    async fn malformed_and_foreign_algorithms_are_rejected() {
        let (tokens, _) = service();
        let token = tokens.sign(&subject(), TokenKind::Access).await.unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        assert!(tokens.verify("not-a-token").await.is_none());
        assert!(tokens.verify(&format!("{}.extra", token)).await.is_none());

        let mut header: TokenHeader = decode_segment(parts[0]).unwrap();
        header.alg = "HS256".to_string();
        let swapped = format!("{}.{}.{}", encode_segment(&header).unwrap(), parts[1], parts[2]);
        assert!(tokens.verify(&swapped).await.is_none());
    }

    #[tokio::test]
    async fn tokens_survive_rotation_but_not_revocation() {
        let (tokens, keys) = service();
        let token = tokens.sign(&subject(), TokenKind::Access).await.unwrap();
        let old = keys.active_key().await.unwrap();

        keys.rotate().await.unwrap();
        assert!(tokens.verify(&token).await.is_some());

        let fresh = tokens.sign(&subject(), TokenKind::Access).await.unwrap();
        keys.revoke(&old.kid).await.unwrap();
        assert!(tokens.verify(&token).await.is_none());
        assert!(tokens.verify(&fresh).await.is_some());
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_reuse() {
        let (tokens, _) = service();
        let subject = subject();
        let pair = tokens.create_pair(&subject).await.unwrap();

        let rotated = tokens.refresh(&pair.refresh_token).await.unwrap().unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);
        assert!(tokens.refresh(&pair.refresh_token).await.unwrap().is_none());
        assert!(tokens.refresh(&rotated.refresh_token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn access_token_cannot_refresh() {
        let (tokens, _) = service();
        let pair = tokens.create_pair(&subject()).await.unwrap();

        assert!(tokens.refresh(&pair.access_token).await.unwrap().is_none());
        assert!(
            tokens
                .verify_kind(&pair.refresh_token, TokenKind::Access)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn concurrent_refresh_has_one_winner() {
        let (tokens, _) = service();
        let pair = tokens.create_pair(&subject()).await.unwrap();

        let (a, b) = tokio::join!(
            tokens.refresh(&pair.refresh_token),
            tokens.refresh(&pair.refresh_token)
        );
        let winners = [a.unwrap(), b.unwrap()].iter().filter(|r| r.is_some()).count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn logout_revokes_outstanding_refresh_tokens() {
        let (tokens, _) = service();
        let subject = subject();
        let first = tokens.create_pair(&subject).await.unwrap();
        let second = tokens.create_pair(&subject).await.unwrap();

        assert_eq!(tokens.revoke_all_refresh_tokens(subject.user_id).await.unwrap(), 2);
        assert!(tokens.refresh(&first.refresh_token).await.unwrap().is_none());
        assert!(tokens.refresh(&second.refresh_token).await.unwrap().is_none());
    }
}
