//! SQLite pool setup for the local mirror.

use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Schema migrations, embedded at compile time. Exposed so tests can run
/// them against in-memory pools.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("src/storage/migrations");

/// Open (creating if missing) the mirror database and bring the schema up to
/// date.
pub async fn connect(path: &str) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(&format!("sqlite://{path}?mode=rwc"))
        .map_err(|e| BridgeError::store(format!("database path {path:?}: {e}")))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(opts).await?;
    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| BridgeError::store(format!("migrations: {e}")))?;
    Ok(pool)
}

/// In-memory pool for unit tests. Capped at one connection: every SQLite
/// `:memory:` connection is its own database, so a second pooled connection
/// would see an empty schema.
#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    MIGRATOR.run(&pool).await.unwrap();
    pool
}
