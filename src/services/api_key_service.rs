//! Long-lived API keys for programmatic access, plus their usage log.
//!
//! A key looks like `arb_` followed by 48 hex characters. Only its SHA-256
//! digest and a short display prefix are stored; the plaintext is returned
//! once, at creation.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    api_key::{ApiKey, ApiKeyIdentity, ApiKeyResponse, CreatedApiKey},
    usage::{NewUsageEntry, UsageStats},
};
use crate::services::sha256_hex;
use crate::store::Store;

/// Marker every API key starts with.
pub const API_KEY_PREFIX: &str = "arb_";

/// Longest accepted display name.
pub const MAX_KEY_NAME_LEN: usize = 100;

/// Longest accepted usage window.
pub const MAX_USAGE_DAYS: u32 = 365;

#[derive(Clone)]
pub struct ApiKeyService {
    store: Arc<dyn Store>,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a key for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the name is longer than 100
    /// characters.
    pub async fn create(
        &self,
        user_id: Uuid,
        name: Option<String>,
    ) -> Result<CreatedApiKey, AppError> {
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if name
            .as_ref()
            .is_some_and(|n| n.chars().count() > MAX_KEY_NAME_LEN)
        {
            return Err(AppError::Validation(format!(
                "Key name must be at most {} characters",
                MAX_KEY_NAME_LEN
            )));
        }

        let plaintext = generate_key();
        let record = ApiKey {
            id: Uuid::new_v4(),
            user_id,
            key_hash: sha256_hex(&plaintext),
            key_prefix: display_prefix(&plaintext),
            name,
            created_at: Utc::now(),
            last_used_at: None,
            revoked_at: None,
        };
        self.store.insert_api_key(&record).await?;

        tracing::info!(user_id = %user_id, key_id = %record.id, "Created API key");

        Ok(CreatedApiKey {
            key: plaintext,
            id: record.id,
            key_prefix: record.key_prefix,
            name: record.name,
            created_at: record.created_at,
        })
    }

    /// Non-revoked keys of `user_id`, newest first.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<ApiKeyResponse>, AppError> {
        let keys = self.store.list_api_keys(user_id).await?;
        Ok(keys.into_iter().map(ApiKeyResponse::from).collect())
    }

    /// Revoke a key owned by `user_id`.
    ///
    /// Returns `false` for unknown keys, keys owned by someone else and keys
    /// already revoked.
    pub async fn revoke(&self, key_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let revoked = self
            .store
            .revoke_api_key(key_id, user_id, Utc::now())
            .await?;
        if revoked {
            tracing::info!(user_id = %user_id, key_id = %key_id, "Revoked API key");
        }
        Ok(revoked)
    }

    /// Resolve a presented key to its owner.
    ///
    /// On success `last_used_at` is updated in the background; a failure
    /// there is logged and does not affect the caller.
    pub async fn validate(&self, plaintext: &str) -> Result<Option<ApiKeyIdentity>, AppError> {
        let Some(key) = self.store.find_api_key_by_hash(&sha256_hex(plaintext)).await? else {
            return Ok(None);
        };

        let store = Arc::clone(&self.store);
        let key_id = key.id;
        tokio::spawn(async move {
            if let Err(e) = store.touch_api_key(key_id, Utc::now()).await {
                tracing::warn!(key_id = %key_id, "Failed to update API key last_used_at: {}", e);
            }
        });

        Ok(Some(ApiKeyIdentity {
            user_id: key.user_id,
            key_id: key.id,
        }))
    }

    /// Append a usage row. Never fails the caller.
    pub async fn record_usage(&self, entry: NewUsageEntry) {
        let entry = entry.into_entry(Utc::now());
        if let Err(e) = self.store.insert_usage(&entry).await {
            tracing::warn!(
                key_id = %entry.api_key_id,
                tool = %entry.tool,
                "Failed to record usage: {}",
                e
            );
        }
    }

    /// Usage over the last `days` days (clamped to 1..=365) across every key
    /// the user has ever owned.
    pub async fn usage_stats(&self, user_id: Uuid, days: u32) -> Result<UsageStats, AppError> {
        let days = days.clamp(1, MAX_USAGE_DAYS);
        let since = Utc::now() - Duration::days(i64::from(days));
        Ok(self.store.usage_stats(user_id, since).await?)
    }
}

/// `arb_` + 24 random bytes as hex.
fn generate_key() -> String {
    let bytes: [u8; 24] = rand::random();
    format!("{}{}", API_KEY_PREFIX, hex::encode(bytes))
}

/// First 8 characters after the marker, for display.
fn display_prefix(key: &str) -> String {
    let body = key.strip_prefix(API_KEY_PREFIX).unwrap_or(key);
    let head: String = body.chars().take(8).collect();
    format!("{}{}...", API_KEY_PREFIX, head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> (ApiKeyService, MemoryStore) {
        let store = MemoryStore::new();
        (ApiKeyService::new(Arc::new(store.clone())), store)
    }

    #[test]
    fn key_shape() {
        let key = generate_key();
        assert!(key.starts_with(API_KEY_PREFIX));
        assert_eq!(key.len(), API_KEY_PREFIX.len() + 48);

        let prefix = display_prefix(&key);
        assert_eq!(prefix, format!("{}...", &key[..12]));
    }

    #[tokio::test]
    async fn created_key_validates_until_revoked() {
        let (keys, _) = service();
        let user_id = Uuid::new_v4();

        let created = keys.create(user_id, Some("ci".to_string())).await.unwrap();
        let identity = keys.validate(&created.key).await.unwrap().unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.key_id, created.id);

        assert!(keys.revoke(created.id, user_id).await.unwrap());
        assert!(keys.validate(&created.key).await.unwrap().is_none());
        assert!(keys.list(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cannot_revoke_someone_elses_key() {
        let (keys, _) = service();
        let owner = Uuid::new_v4();
        let created = keys.create(owner, None).await.unwrap();

        assert!(!keys.revoke(created.id, Uuid::new_v4()).await.unwrap());
        assert!(keys.validate(&created.key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn blank_name_is_dropped_and_long_name_rejected() {
        let (keys, _) = service();
        let user_id = Uuid::new_v4();

        let created = keys.create(user_id, Some("   ".to_string())).await.unwrap();
        assert!(created.name.is_none());

        let err = keys.create(user_id, Some("x".repeat(101))).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn list_is_newest_first_and_hides_secrets() {
        let (keys, _) = service();
        let user_id = Uuid::new_v4();
        let first = keys.create(user_id, Some("first".to_string())).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = keys.create(user_id, Some("second".to_string())).await.unwrap();

        let listed = keys.list(user_id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);

        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains(&first.key));
        assert!(!json.contains("key_hash"));
    }

    #[tokio::test]
    async fn usage_failures_are_swallowed() {
        let (keys, store) = service();
        let created = keys.create(Uuid::new_v4(), None).await.unwrap();

        store.fail_best_effort_writes(true);
        keys.record_usage(NewUsageEntry {
            api_key_id: created.id,
            tool: "ask_stylus".to_string(),
            tokens_used: 10,
            latency_ms: 5,
            success: true,
            error_message: None,
        })
        .await;
        assert!(keys.validate(&created.key).await.unwrap().is_some());
        assert!(store.usage_entries().is_empty());
    }

    #[tokio::test]
    async fn usage_stats_cover_revoked_keys() {
        let (keys, _) = service();
        let user_id = Uuid::new_v4();
        let created = keys.create(user_id, None).await.unwrap();

        for tool in ["ask_stylus", "ask_stylus", "get_workflow"] {
            keys.record_usage(NewUsageEntry {
                api_key_id: created.id,
                tool: tool.to_string(),
                tokens_used: 7,
                latency_ms: 1,
                success: true,
                error_message: None,
            })
            .await;
        }
        keys.revoke(created.id, user_id).await.unwrap();

        let stats = keys.usage_stats(user_id, 0).await.unwrap();
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.total_tokens, 21);
        assert_eq!(stats.calls_by_tool["ask_stylus"], 2);
        assert_eq!(stats.daily_usage.len(), 1);
    }
}
