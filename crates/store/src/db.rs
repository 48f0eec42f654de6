use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use pitwall_core::config::PostgresConfig;

use crate::error::StoreError;

/// Create a PostgreSQL connection pool and run migrations.
pub async fn init_pg_pool(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    if !config.is_configured() {
        return Err(StoreError::NotConfigured("PG_USERNAME not set".into()));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await?;
    info!("PostgreSQL connected: {}", config.host);

    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("Database migrations applied");

    Ok(pool)
}
