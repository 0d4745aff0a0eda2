use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::Result;

/// Open the sqlite pool and ensure the schema exists.
pub async fn init_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout))
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gpu_models (
            id           TEXT PRIMARY KEY,
            name         TEXT NOT NULL,
            manufacturer TEXT NOT NULL,
            vram_gb      INTEGER NOT NULL,
            aliases      TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS providers (
            id   TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only ledger: no uniqueness constraint across rows, rows for
    // the same (provider, model) pair form a time series.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS price_records (
            id             TEXT PRIMARY KEY,
            provider_id    TEXT NOT NULL,
            gpu_model_id   TEXT NOT NULL,
            price_per_hour REAL NOT NULL,
            gpu_count      INTEGER NOT NULL,
            source_name    TEXT NOT NULL,
            source_url     TEXT NOT NULL,
            created_at     TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_price_records_created_at
         ON price_records (created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Single-connection in-memory pool for unit tests. One connection so
/// every query sees the same in-memory database.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    init_schema(&pool).await.expect("schema");
    pool
}
