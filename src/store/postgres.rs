//! PostgreSQL store.
//!
//! All queries are plain `sqlx::query*` calls against the schema in
//! `migrations/`. Race-deciding writes are conditional `UPDATE`s whose
//! affected-row count (or `RETURNING` row) tells the caller whether it won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    ApiKeyStore, OneTimeCodeStore, RefreshTokenStore, SigningKeyStore, StoreResult, UsageStore,
    UserStore,
};
use crate::db::DbPool;
use crate::models::{
    api_key::ApiKey,
    one_time_code::OneTimeCode,
    refresh_token::RefreshTokenRecord,
    signing_key::SigningKeyRecord,
    usage::{DailyUsage, UsageLogEntry, UsageStats},
    user::User,
};

/// Store backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, name, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_or_create_user(&self, email: &str, now: DateTime<Utc>) -> StoreResult<User> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, email, name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }
}

#[async_trait]
impl SigningKeyStore for PgStore {
    async fn find_active_signing_key(
        &self,
        valid_past: DateTime<Utc>,
    ) -> StoreResult<Option<SigningKeyRecord>> {
        let key = sqlx::query_as::<_, SigningKeyRecord>(
            r#"
            SELECT * FROM jwt_keys
            WHERE is_active = true
              AND revoked_at IS NULL
              AND (expires_at IS NULL OR expires_at > $1)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(valid_past)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn insert_active_signing_key(&self, key: &SigningKeyRecord) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE jwt_keys SET is_active = false WHERE is_active = true")
            .execute(&mut *tx)
            .await?;

        // The partial unique index on is_active rejects a concurrent winner
        sqlx::query(
            r#"
            INSERT INTO jwt_keys (
                id, kid, private_key, public_key, algorithm,
                is_active, created_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, true, $6, $7)
            "#,
        )
        .bind(key.id)
        .bind(&key.kid)
        .bind(&key.private_key)
        .bind(&key.public_key)
        .bind(&key.algorithm)
        .bind(key.created_at)
        .bind(key.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_signing_key(&self, kid: &str) -> StoreResult<Option<SigningKeyRecord>> {
        let key = sqlx::query_as::<_, SigningKeyRecord>(
            "SELECT * FROM jwt_keys WHERE kid = $1 AND revoked_at IS NULL",
        )
        .bind(kid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn list_verification_keys(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<SigningKeyRecord>> {
        let keys = sqlx::query_as::<_, SigningKeyRecord>(
            r#"
            SELECT * FROM jwt_keys
            WHERE revoked_at IS NULL
              AND (expires_at IS NULL OR expires_at > $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn revoke_signing_key(&self, kid: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jwt_keys
            SET revoked_at = $2, is_active = false
            WHERE kid = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(kid)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > $2
            RETURNING user_id
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id)
    }

    async fn revoke_user_refresh_tokens(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OneTimeCodeStore for PgStore {
    async fn count_codes_since(&self, email: &str, since: DateTime<Utc>) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM otp_codes WHERE email = $1 AND created_at > $2",
        )
        .bind(email)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn issue_code(
        &self,
        code: &OneTimeCode,
        since: DateTime<Utc>,
        max: i64,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        // Held until commit; concurrent issuers for one email queue here
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&code.email)
            .execute(&mut *tx)
            .await?;

        let issued: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM otp_codes WHERE email = $1 AND created_at > $2",
        )
        .bind(&code.email)
        .bind(since)
        .fetch_one(&mut *tx)
        .await?;

        if issued >= max {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE otp_codes SET used_at = $2 WHERE email = $1 AND used_at IS NULL")
            .bind(&code.email)
            .bind(code.created_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO otp_codes (id, email, code_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(code.id)
        .bind(&code.email)
        .bind(&code.code_hash)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn redeem_code(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE otp_codes
            SET used_at = $3
            WHERE id = (
                SELECT id FROM otp_codes
                WHERE email = $1 AND code_hash = $2 AND used_at IS NULL AND expires_at > $3
                ORDER BY created_at DESC
                LIMIT 1
            )
            AND used_at IS NULL
            "#,
        )
        .bind(email)
        .bind(code_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_codes_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM otp_codes WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ApiKeyStore for PgStore {
    async fn insert_api_key(&self, key: &ApiKey) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (id, user_id, key_hash, key_prefix, name, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(key.id)
        .bind(key.user_id)
        .bind(&key.key_hash)
        .bind(&key.key_prefix)
        .bind(&key.name)
        .bind(key.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_api_keys(&self, user_id: Uuid) -> StoreResult<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT * FROM api_keys
            WHERE user_id = $1 AND revoked_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn revoke_api_key(
        &self,
        key_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET revoked_at = $3
            WHERE id = $1 AND user_id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(key_id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE key_hash = $1 AND revoked_at IS NULL",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn touch_api_key(&self, key_id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(key_id)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl UsageStore for PgStore {
    async fn insert_usage(&self, entry: &UsageLogEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO usage_logs (
                id, api_key_id, tool, tokens_used, latency_ms,
                success, error_message, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.api_key_id)
        .bind(&entry.tool)
        .bind(entry.tokens_used)
        .bind(entry.latency_ms)
        .bind(entry.success)
        .bind(&entry.error_message)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn usage_stats(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<UsageStats> {
        let (total_calls, total_tokens): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(ul.tokens_used), 0)::BIGINT
            FROM usage_logs ul
            JOIN api_keys ak ON ul.api_key_id = ak.id
            WHERE ak.user_id = $1 AND ul.created_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let by_tool: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT ul.tool, COUNT(*)
            FROM usage_logs ul
            JOIN api_keys ak ON ul.api_key_id = ak.id
            WHERE ak.user_id = $1 AND ul.created_at >= $2
            GROUP BY ul.tool
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let daily_usage = sqlx::query_as::<_, DailyUsage>(
            r#"
            SELECT (ul.created_at AT TIME ZONE 'UTC')::DATE AS date,
                   COUNT(*) AS calls,
                   COALESCE(SUM(ul.tokens_used), 0)::BIGINT AS tokens
            FROM usage_logs ul
            JOIN api_keys ak ON ul.api_key_id = ak.id
            WHERE ak.user_id = $1 AND ul.created_at >= $2
            GROUP BY 1
            ORDER BY 1 DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(UsageStats {
            total_calls,
            total_tokens,
            calls_by_tool: by_tool.into_iter().collect(),
            daily_usage,
        })
    }
}
