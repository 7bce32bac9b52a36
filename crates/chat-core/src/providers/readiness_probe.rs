//! Backing-store readiness probe (port)

use async_trait::async_trait;

use crate::error::DomainError;

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Short name reported by the readiness endpoint, e.g. `postgres`.
    fn name(&self) -> &'static str;

    async fn ping(&self) -> Result<(), DomainError>;
}
