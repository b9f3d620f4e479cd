//! In-process store for tests.
//!
//! Every operation takes one lock over the whole state, which gives the same
//! all-or-nothing behavior the PostgreSQL statements provide.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
    ApiKeyStore, OneTimeCodeStore, RefreshTokenStore, SigningKeyStore, StoreError, StoreResult,
    UsageStore, UserStore,
};
use crate::models::{
    api_key::ApiKey,
    one_time_code::OneTimeCode,
    refresh_token::RefreshTokenRecord,
    signing_key::SigningKeyRecord,
    usage::{DailyUsage, UsageLogEntry, UsageStats},
    user::User,
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    signing_keys: Vec<SigningKeyRecord>,
    refresh_tokens: Vec<RefreshTokenRecord>,
    codes: Vec<OneTimeCode>,
    api_keys: Vec<ApiKey>,
    usage: Vec<UsageLogEntry>,
}

/// Store holding every table in memory.
///
/// Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    fail_best_effort_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make usage inserts and `last_used_at` updates fail.
    pub fn fail_best_effort_writes(&self, fail: bool) {
        self.fail_best_effort_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of the usage log, oldest first.
    pub fn usage_entries(&self) -> Vec<UsageLogEntry> {
        self.state.lock().usage.clone()
    }

    /// Any API key by id, revoked or not.
    pub fn api_key(&self, key_id: Uuid) -> Option<ApiKey> {
        self.state.lock().api_keys.iter().find(|k| k.id == key_id).cloned()
    }

    /// Every signing key, in insertion order.
    pub fn signing_keys(&self) -> Vec<SigningKeyRecord> {
        self.state.lock().signing_keys.clone()
    }

    fn check_best_effort(&self) -> StoreResult<()> {
        if self.fail_best_effort_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let state = self.state.lock();
        Ok(state.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_or_create_user(&self, email: &str, now: DateTime<Utc>) -> StoreResult<User> {
        let mut state = self.state.lock();
        if let Some(user) = state.users.iter().find(|u| u.email == email) {
            return Ok(user.clone());
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: None,
            created_at: now,
        };
        state.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl SigningKeyStore for MemoryStore {
    async fn find_active_signing_key(
        &self,
        valid_past: DateTime<Utc>,
    ) -> StoreResult<Option<SigningKeyRecord>> {
        let state = self.state.lock();
        Ok(state
            .signing_keys
            .iter()
            .filter(|k| k.is_active && k.revoked_at.is_none())
            .filter(|k| k.expires_at.is_none_or(|exp| exp > valid_past))
            .max_by_key(|k| k.created_at)
            .cloned())
    }

    async fn insert_active_signing_key(&self, key: &SigningKeyRecord) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.signing_keys.iter().any(|k| k.kid == key.kid) {
            return Err(StoreError::Conflict(format!("kid already exists: {}", key.kid)));
        }

        for existing in state.signing_keys.iter_mut() {
            existing.is_active = false;
        }

        let mut key = key.clone();
        key.is_active = true;
        state.signing_keys.push(key);
        Ok(())
    }

    async fn find_signing_key(&self, kid: &str) -> StoreResult<Option<SigningKeyRecord>> {
        let state = self.state.lock();
        Ok(state
            .signing_keys
            .iter()
            .find(|k| k.kid == kid && k.revoked_at.is_none())
            .cloned())
    }

    async fn list_verification_keys(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<SigningKeyRecord>> {
        let state = self.state.lock();
        let mut keys: Vec<SigningKeyRecord> = state
            .signing_keys
            .iter()
            .filter(|k| k.can_verify_at(now))
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn revoke_signing_key(&self, kid: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.state.lock();
        match state
            .signing_keys
            .iter_mut()
            .find(|k| k.kid == kid && k.revoked_at.is_none())
        {
            Some(key) => {
                key.revoked_at = Some(now);
                key.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state
            .refresh_tokens
            .iter()
            .any(|r| r.token_hash == record.token_hash)
        {
            return Err(StoreError::Conflict("duplicate refresh token hash".to_string()));
        }
        state.refresh_tokens.push(record.clone());
        Ok(())
    }

    async fn consume_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>> {
        let mut state = self.state.lock();
        match state
            .refresh_tokens
            .iter_mut()
            .find(|r| r.token_hash == token_hash && r.is_live(now))
        {
            Some(record) => {
                record.revoked_at = Some(now);
                Ok(Some(record.user_id))
            }
            None => Ok(None),
        }
    }

    async fn revoke_user_refresh_tokens(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let mut revoked = 0;
        for record in state
            .refresh_tokens
            .iter_mut()
            .filter(|r| r.user_id == user_id && r.revoked_at.is_none())
        {
            record.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }
}

#[async_trait]
impl OneTimeCodeStore for MemoryStore {
    async fn count_codes_since(&self, email: &str, since: DateTime<Utc>) -> StoreResult<i64> {
        let state = self.state.lock();
        let count = state
            .codes
            .iter()
            .filter(|c| c.email == email && c.created_at > since)
            .count();
        Ok(count as i64)
    }

    async fn issue_code(
        &self,
        code: &OneTimeCode,
        since: DateTime<Utc>,
        max: i64,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock();
        let issued = state
            .codes
            .iter()
            .filter(|c| c.email == code.email && c.created_at > since)
            .count();
        if issued as i64 >= max {
            return Ok(false);
        }

        for existing in state
            .codes
            .iter_mut()
            .filter(|c| c.email == code.email && c.used_at.is_none())
        {
            existing.used_at = Some(code.created_at);
        }
        state.codes.push(code.clone());
        Ok(true)
    }

    async fn redeem_code(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock();
        let newest = state
            .codes
            .iter_mut()
            .filter(|c| c.email == email && c.code_hash == code_hash && c.is_redeemable(now))
            .max_by_key(|c| c.created_at);

        match newest {
            Some(code) => {
                code.used_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_codes_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let before = state.codes.len();
        state.codes.retain(|c| c.expires_at >= cutoff);
        Ok((before - state.codes.len()) as u64)
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn insert_api_key(&self, key: &ApiKey) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.api_keys.iter().any(|k| k.key_hash == key.key_hash) {
            return Err(StoreError::Conflict("duplicate api key hash".to_string()));
        }
        state.api_keys.push(key.clone());
        Ok(())
    }

    async fn list_api_keys(&self, user_id: Uuid) -> StoreResult<Vec<ApiKey>> {
        let state = self.state.lock();
        let mut keys: Vec<ApiKey> = state
            .api_keys
            .iter()
            .filter(|k| k.user_id == user_id && k.revoked_at.is_none())
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn revoke_api_key(
        &self,
        key_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock();
        match state
            .api_keys
            .iter_mut()
            .find(|k| k.id == key_id && k.user_id == user_id && k.revoked_at.is_none())
        {
            Some(key) => {
                key.revoked_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        let state = self.state.lock();
        Ok(state
            .api_keys
            .iter()
            .find(|k| k.key_hash == key_hash && k.revoked_at.is_none())
            .cloned())
    }

    async fn touch_api_key(&self, key_id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        self.check_best_effort()?;
        let mut state = self.state.lock();
        if let Some(key) = state.api_keys.iter_mut().find(|k| k.id == key_id) {
            key.last_used_at = Some(now);
        }
        Ok(())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn insert_usage(&self, entry: &UsageLogEntry) -> StoreResult<()> {
        self.check_best_effort()?;
        self.state.lock().usage.push(entry.clone());
        Ok(())
    }

    async fn usage_stats(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<UsageStats> {
        let state = self.state.lock();
        let owned: Vec<Uuid> = state
            .api_keys
            .iter()
            .filter(|k| k.user_id == user_id)
            .map(|k| k.id)
            .collect();

        let mut stats = UsageStats::default();
        let mut daily: BTreeMap<chrono::NaiveDate, (i64, i64)> = BTreeMap::new();

        for entry in state
            .usage
            .iter()
            .filter(|e| owned.contains(&e.api_key_id) && e.created_at >= since)
        {
            stats.total_calls += 1;
            stats.total_tokens += i64::from(entry.tokens_used);
            *stats.calls_by_tool.entry(entry.tool.clone()).or_insert(0) += 1;

            let day = daily.entry(entry.created_at.date_naive()).or_insert((0, 0));
            day.0 += 1;
            day.1 += i64::from(entry.tokens_used);
        }

        stats.daily_usage = daily
            .into_iter()
            .rev()
            .map(|(date, (calls, tokens))| DailyUsage { date, calls, tokens })
            .collect();

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn consume_refresh_token_succeeds_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user_id = Uuid::new_v4();

        store
            .insert_refresh_token(&RefreshTokenRecord {
                id: Uuid::new_v4(),
                user_id,
                token_hash: "abc".to_string(),
                expires_at: now + Duration::days(7),
                revoked_at: None,
            })
            .await
            .unwrap();

        assert_eq!(store.consume_refresh_token("abc", now).await.unwrap(), Some(user_id));
        assert_eq!(store.consume_refresh_token("abc", now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn rotation_leaves_one_active_key() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let first = SigningKeyRecord::generate(now, now + Duration::days(90));
        let second = SigningKeyRecord::generate(now + Duration::seconds(1), now + Duration::days(90));
        store.insert_active_signing_key(&first).await.unwrap();
        store.insert_active_signing_key(&second).await.unwrap();

        let active: Vec<_> = store
            .signing_keys()
            .into_iter()
            .filter(|k| k.is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kid, second.kid);

        // The rotated-out key is still found for verification
        assert!(store.find_signing_key(&first.kid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn issue_code_invalidates_previous_codes() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let make = |hash: &str, at: DateTime<Utc>| OneTimeCode {
            id: Uuid::new_v4(),
            email: "a@b.co".to_string(),
            code_hash: hash.to_string(),
            expires_at: at + Duration::minutes(10),
            created_at: at,
            used_at: None,
        };

        let since = now - Duration::hours(1);
        assert!(store.issue_code(&make("first", now), since, 5).await.unwrap());
        assert!(
            store
                .issue_code(&make("second", now + Duration::seconds(1)), since, 5)
                .await
                .unwrap()
        );

        assert!(!store.redeem_code("a@b.co", "first", now).await.unwrap());
        assert!(store.redeem_code("a@b.co", "second", now).await.unwrap());
    }

    #[tokio::test]
    async fn usage_stats_group_by_tool_and_day() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        let key = ApiKey {
            id: Uuid::new_v4(),
            user_id,
            key_hash: "h".to_string(),
            key_prefix: "arb_00000000...".to_string(),
            name: None,
            created_at: now,
            last_used_at: None,
            revoked_at: None,
        };
        store.insert_api_key(&key).await.unwrap();

        for (tool, tokens, at) in [
            ("ask_stylus", 10, now),
            ("ask_stylus", 5, now),
            ("get_workflow", 0, now - Duration::days(1)),
            ("get_workflow", 99, now - Duration::days(40)),
        ] {
            store
                .insert_usage(&UsageLogEntry {
                    id: Uuid::new_v4(),
                    api_key_id: key.id,
                    tool: tool.to_string(),
                    tokens_used: tokens,
                    latency_ms: 1,
                    success: true,
                    error_message: None,
                    created_at: at,
                })
                .await
                .unwrap();
        }

        let stats = store
            .usage_stats(user_id, now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.total_tokens, 15);
        assert_eq!(stats.calls_by_tool["ask_stylus"], 2);
        assert_eq!(stats.daily_usage.len(), 2);
        assert_eq!(stats.daily_usage[0].date, now.date_naive());
    }
}
