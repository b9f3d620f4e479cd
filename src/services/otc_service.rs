//! One-time login codes sent by email.
//!
//! Codes are six uniformly random digits, valid for 10 minutes, and stored
//! only as an HMAC-SHA256 digest keyed with `CODE_HASH_KEY`. Issuing a code
//! retires every earlier unused code for the same address.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    one_time_code::{IssuedCode, OneTimeCode, is_well_formed_code},
    user::normalize_email,
};
use crate::store::Store;

type HmacSha256 = Hmac<Sha256>;

/// How long an issued code can be redeemed.
pub const CODE_TTL_MINUTES: i64 = 10;

/// Codes one address may be issued within the rate window.
pub const MAX_CODES_PER_WINDOW: i64 = 5;

/// Trailing window for the issuance limit.
pub const RATE_WINDOW_MINUTES: i64 = 60;

/// Expired codes are kept this long before cleanup removes them.
pub const CLEANUP_GRACE_MINUTES: i64 = 60;

#[derive(Clone)]
pub struct OneTimeCodeService {
    store: Arc<dyn Store>,
    hash_key: Arc<[u8]>,
}

impl OneTimeCodeService {
    pub fn new(store: Arc<dyn Store>, hash_key: &str) -> Self {
        Self {
            store,
            hash_key: Arc::from(hash_key.as_bytes()),
        }
    }

    /// Whether `email` may be issued another code at `now`.
    pub async fn check_rate_limit_at(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let since = now - Duration::minutes(RATE_WINDOW_MINUTES);
        let issued = self
            .store
            .count_codes_since(&normalize_email(email), since)
            .await?;
        Ok(issued < MAX_CODES_PER_WINDOW)
    }

    /// Issue a new code for `email`.
    ///
    /// Returns `Ok(None)` when the address is over its hourly limit. The
    /// plaintext code only exists in the returned value.
    pub async fn create(&self, email: &str) -> Result<Option<IssuedCode>, AppError> {
        self.create_at(email, Utc::now()).await
    }

    pub async fn create_at(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<IssuedCode>, AppError> {
        let code = generate_code();
        let record = OneTimeCode {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            code_hash: self.hash_code(&code),
            expires_at: now + Duration::minutes(CODE_TTL_MINUTES),
            created_at: now,
            used_at: None,
        };
        let since = now - Duration::minutes(RATE_WINDOW_MINUTES);
        if !self
            .store
            .issue_code(&record, since, MAX_CODES_PER_WINDOW)
            .await?
        {
            tracing::warn!(email = %record.email, "One-time code rate limit reached");
            return Ok(None);
        }

        Ok(Some(IssuedCode {
            code,
            expires_at: record.expires_at,
        }))
    }

    /// Redeem `code` for `email`. Succeeds at most once per issued code.
    pub async fn verify(&self, email: &str, code: &str) -> Result<bool, AppError> {
        self.verify_at(email, code, Utc::now()).await
    }

    pub async fn verify_at(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        if !is_well_formed_code(code) {
            return Ok(false);
        }

        let redeemed = self
            .store
            .redeem_code(&normalize_email(email), &self.hash_code(code), now)
            .await?;
        Ok(redeemed)
    }

    /// Delete codes that expired more than an hour ago.
    pub async fn cleanup_expired(&self) -> Result<u64, AppError> {
        let cutoff = Utc::now() - Duration::minutes(CLEANUP_GRACE_MINUTES);
        let deleted = self.store.delete_codes_expired_before(cutoff).await?;
        tracing::info!(deleted, "Cleaned up expired one-time codes");
        Ok(deleted)
    }

    fn hash_code(&self, code: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.hash_key).expect("HMAC can take key of any size");
        mac.update(code.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Uniform over `000000..=999999`.
fn generate_code() -> String {
    let value: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> OneTimeCodeService {
        OneTimeCodeService::new(Arc::new(MemoryStore::new()), "test-pepper")
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..200 {
            assert!(is_well_formed_code(&generate_code()));
        }
    }

    #[test]
    fn hash_depends_on_key() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let a = OneTimeCodeService::new(Arc::clone(&store), "key-a");
        let b = OneTimeCodeService::new(store, "key-b");

        assert_eq!(a.hash_code("123456"), a.hash_code("123456"));
        assert_ne!(a.hash_code("123456"), b.hash_code("123456"));
    }

    #[tokio::test]
    async fn code_redeems_once() {
        let codes = service();
        let issued = codes.create("Dev@Example.com").await.unwrap().unwrap();

        assert!(codes.verify("dev@example.com", &issued.code).await.unwrap());
        assert!(!codes.verify("dev@example.com", &issued.code).await.unwrap());
    }

    #[tokio::test]
    async fn new_code_supersedes_old() {
        let codes = service();
        let first = codes.create("dev@example.com").await.unwrap().unwrap();
        let second = codes.create("dev@example.com").await.unwrap().unwrap();

        if first.code != second.code {
            assert!(!codes.verify("dev@example.com", &first.code).await.unwrap());
        }
        assert!(codes.verify("dev@example.com", &second.code).await.unwrap());
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let codes = service();
        let now = Utc::now();
        let issued = codes.create_at("dev@example.com", now).await.unwrap().unwrap();

        let later = now + Duration::minutes(CODE_TTL_MINUTES);
        assert!(!codes.verify_at("dev@example.com", &issued.code, later).await.unwrap());
    }

    #[tokio::test]
    async fn sixth_code_within_an_hour_is_refused() {
        let codes = service();
        let now = Utc::now();

        for i in 0..MAX_CODES_PER_WINDOW {
            let at = now + Duration::minutes(i);
            assert!(codes.create_at("dev@example.com", at).await.unwrap().is_some());
        }
        let at = now + Duration::minutes(10);
        assert!(codes.create_at("dev@example.com", at).await.unwrap().is_none());

        // Other addresses are unaffected, and the window slides
        assert!(codes.create_at("other@example.com", at).await.unwrap().is_some());
        let after_window = now + Duration::minutes(RATE_WINDOW_MINUTES + 1);
        assert!(codes.create_at("dev@example.com", after_window).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_requests_stay_within_limit() {
        let codes = service();
        let now = Utc::now();

        let attempts = (0..20).map(|_| {
            let codes = codes.clone();
            tokio::spawn(async move { codes.create_at("race@example.com", now).await })
        });
        let issued: Vec<IssuedCode> = futures::future::join_all(attempts)
            .await
            .into_iter()
            .filter_map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(issued.len() as i64, MAX_CODES_PER_WINDOW);
        assert!(!codes.check_rate_limit_at("race@example.com", now).await.unwrap());

        // Only the last issued code is still redeemable
        let mut redeemable = 0;
        for code in &issued {
            if codes.verify_at("race@example.com", &code.code, now).await.unwrap() {
                redeemable += 1;
            }
        }
        assert_eq!(redeemable, 1);
    }

    #[tokio::test]
    async fn malformed_code_never_matches() {
        let codes = service();
        codes.create("dev@example.com").await.unwrap().unwrap();

        assert!(!codes.verify("dev@example.com", "12345").await.unwrap());
        assert!(!codes.verify("dev@example.com", "abcdef").await.unwrap());
    }
}
