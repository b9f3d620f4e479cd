//! PostgreSQL pool and schema migrations.
//!
//! Only the binary touches these; tests run against
//! [`MemoryStore`](crate::store::MemoryStore).

use std::time::Duration;

use sqlx::{Pool, Postgres, postgres::PgPoolOptions};

pub type DbPool = Pool<Postgres>;

/// How long a request waits for a free connection before the store call fails.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect a pool of at most `max_connections` connections.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the first connection cannot be
/// established (unreachable server, bad credentials).
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
}

/// Apply pending migrations from `migrations/`, embedded at compile time.
///
/// Applied versions are recorded in `_sqlx_migrations`, so this is safe to
/// run on every start and from several instances at once.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
