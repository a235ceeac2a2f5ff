//! Connection pool construction (spec §4.3: bounded pool, default max 20).

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Verifies each checked-out connection with a trivial round trip before
    /// handing it back to the caller.
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://conclave.db".to_string(),
            max_connections: 20,
            acquire_timeout: Duration::from_secs(10),
            test_before_acquire: true,
        }
    }
}

pub async fn connect(config: &PoolConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .test_before_acquire(config.test_before_acquire)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Apply embedded migrations. Idempotent — safe to call on every startup.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
