//! Usage metering models.
//!
//! Every tool invocation made with an API key appends one usage row.
//! Rows are never updated or deleted by this service.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A usage log row as stored.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct UsageLogEntry {
    pub id: Uuid,
    pub api_key_id: Uuid,
    pub tool: String,
    pub tokens_used: i32,
    pub latency_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A usage row about to be appended.
#[derive(Debug, Clone)]
pub struct NewUsageEntry {
    pub api_key_id: Uuid,
    pub tool: String,
    pub tokens_used: i32,
    pub latency_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
}

impl NewUsageEntry {
    pub fn into_entry(self, created_at: DateTime<Utc>) -> UsageLogEntry {
        UsageLogEntry {
            id: Uuid::new_v4(),
            api_key_id: self.api_key_id,
            tool: self.tool,
            tokens_used: self.tokens_used,
            latency_ms: self.latency_ms,
            success: self.success,
            error_message: self.error_message,
            created_at,
        }
    }
}

/// Query string for `GET /api/usage`.
#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    30
}

/// Calls and tokens for one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub calls: i64,
    pub tokens: i64,
}

/// Aggregated usage across all of a user's API keys.
///
/// # JSON Example
///
/// ```json
/// {
///   "total_calls": 42,
///   "total_tokens": 12800,
///   "calls_by_tool": { "ask_stylus": 30, "get_workflow": 12 },
///   "daily_usage": [ { "date": "2025-12-21", "calls": 7, "tokens": 900 } ]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageStats {
    pub total_calls: i64,
    pub total_tokens: i64,
    pub calls_by_tool: BTreeMap<String, i64>,

    /// Most recent day first.
    pub daily_usage: Vec<DailyUsage>,
}
