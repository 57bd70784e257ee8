use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::store::StoreError;
use crate::store::postgres::map_sqlx_error;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a connection pool. Does not run migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;

    tracing::info!(max_connections, "database pool ready");
    Ok(pool)
}

/// Round-trip a trivial query.
pub async fn health_check(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("health_check", e))?;
    Ok(())
}
