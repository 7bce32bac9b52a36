//! Redis connection pool

use async_trait::async_trait;
use deadpool_redis::redis::cmd;
use deadpool_redis::{Config, CreatePoolError, Pool, PoolConfig, Runtime};

use chat_core::error::DomainError;
use chat_core::providers::ReadinessProbe;
use chat_shared::config::RedisSettings;

pub fn create_redis_pool(settings: &RedisSettings) -> Result<Pool, CreatePoolError> {
    let mut config = Config::from_url(settings.url.as_str());
    config.pool = Some(PoolConfig::new(settings.max_connections));
    config.create_pool(Some(Runtime::Tokio1))
}

/// Readiness check: `PING` over a pooled connection.
pub struct RedisProbe {
    pool: Pool,
}

impl RedisProbe {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadinessProbe for RedisProbe {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<(), DomainError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| DomainError::StoreUnavailable(e.to_string()))?;
        cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| DomainError::StoreUnavailable(e.to_string()))
    }
}
