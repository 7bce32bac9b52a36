//! Shutdown sweep: migrate every cached conversation before exit.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::services::migration_scheduler::MigrationScheduler;
use crate::services::migration_service::{MigrationEngine, MigrationSummary};

#[derive(Debug)]
pub enum ShutdownOutcome {
    Completed(MigrationSummary),
    /// Deadline hit; whatever was not migrated stays cached for next time.
    TimedOut,
}

pub struct ShutdownCoordinator {
    engine: MigrationEngine,
    scheduler: Arc<MigrationScheduler>,
    deadline: Duration,
}

impl ShutdownCoordinator {
    pub fn new(engine: MigrationEngine, scheduler: Arc<MigrationScheduler>, deadline: Duration) -> Self {
        Self {
            engine,
            scheduler,
            deadline,
        }
    }

    pub async fn drain(&self) -> ShutdownOutcome {
        let cancelled = self.scheduler.cancel_all();
        info!(
            "Shutdown: {} pending timers cancelled, migrating cache (deadline {:?})",
            cancelled, self.deadline
        );

        match tokio::time::timeout(self.deadline, self.engine.migrate_all()).await {
            Ok(summary) => {
                if !summary.is_clean() {
                    warn!(
                        "Shutdown migration left {} conversations cached",
                        summary.failed.len()
                    );
                }
                ShutdownOutcome::Completed(summary)
            }
            Err(_) => {
                warn!("Shutdown migration exceeded {:?}", self.deadline);
                ShutdownOutcome::TimedOut
            }
        }
    }
}
