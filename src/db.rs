//! SQLite pool creation and schema migration.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// Creates the pool backing the State Store and runs embedded migrations.
///
/// `url` accepts any sqlx SQLite connection string, including `sqlite::memory:`
/// for tests. `create_if_missing` is always set so a fresh deployment doesn't
/// need a provisioning step.
pub async fn create_pool(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    sqlx::migrate!().run(&pool).await?;

    tracing::info!("database pool created and migrations applied");
    Ok(pool)
}

#[cfg(test)]
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(3))
        .connect("sqlite::memory:")
        .await
        .expect("failed to create in-memory database");

    sqlx::migrate!().run(&pool).await.expect("failed to run migrations");

    pool
}
