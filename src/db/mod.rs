//! Connection pool setup for the group store.
//!
//! Every connection pins its session timezone to UTC so `last_seen` /
//! `date_scheduled` comparisons behave the same regardless of server
//! locale.

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;

pub type DbPool = PgPool;

/// Builds the connection pool for the group store from config
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    log::info!(
        "Connecting to group store (max: {}, min: {})",
        config.max_connections,
        config.min_connections
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("SET timezone = 'UTC'").execute(conn).await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await?;

    log::info!("Group store connection pool established");

    Ok(pool)
}

/// Applies pending schema migrations to the group store
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    log::info!("Applying group store migrations...");

    sqlx::migrate!("./migrations").run(pool).await?;

    log::info!("Group store schema is up to date");
    Ok(())
}

/// Cheap liveness probe for the pool
pub async fn health_check(pool: &DbPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}
