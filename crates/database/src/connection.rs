use crate::error::DbError;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::env;
use std::time::Duration;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Opens the ledger pool from `DATABASE_URL`.
///
/// A `.env` file is consulted first when present. `DATABASE_MAX_CONNECTIONS`
/// overrides the pool size.
pub async fn connect() -> Result<PgPool, DbError> {
    dotenvy::dotenv().ok();

    let url = env::var("DATABASE_URL")
        .map_err(|_| DbError::ConnectionConfigError("DATABASE_URL must be set.".to_string()))?;
    let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
        Ok(raw) => raw.parse::<u32>().map_err(|e| {
            DbError::ConnectionConfigError(format!("DATABASE_MAX_CONNECTIONS: {e}"))
        })?,
        Err(_) => DEFAULT_MAX_CONNECTIONS,
    };

    connect_with(&url, max_connections).await
}

pub async fn connect_with(url: &str, max_connections: u32) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;
    tracing::debug!(max_connections, "ledger pool connected");
    Ok(pool)
}

/// Applies the embedded trade ledger migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
