//! Database connection pool

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use chat_core::error::DomainError;
use chat_core::providers::ReadinessProbe;
use chat_shared::config::DatabaseSettings;

/// Connects and brings the schema up to date with the embedded migrations.
pub async fn create_pool(settings: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_seconds))
        .connect(&settings.url)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    info!("Database migrations applied");

    Ok(pool)
}

/// Readiness check against the connection pool.
pub struct PgProbe {
    pool: PgPool,
}

impl PgProbe {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadinessProbe for PgProbe {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), DomainError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| DomainError::StoreUnavailable(e.to_string()))
    }
}
