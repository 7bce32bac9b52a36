//! Per-conversation delayed migration timers.
//!
//! At most one timer is pending per conversation. A timer fires once,
//! performs exactly one migration, and can be cancelled until it fires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::ConversationId;
use crate::services::migration_service::MigrationEngine;

struct PendingTimer {
    generation: u64,
    token: CancellationToken,
}

pub struct MigrationScheduler {
    engine: MigrationEngine,
    delay: Duration,
    pending: Arc<DashMap<ConversationId, PendingTimer>>,
    next_generation: AtomicU64,
}

impl MigrationScheduler {
    pub fn new(engine: MigrationEngine, delay: Duration) -> Self {
        Self {
            engine,
            delay,
            pending: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Arms the timer for `conversation_id`. Returns `false` when one is
    /// already pending; the existing deadline is kept.
    pub fn schedule(&self, conversation_id: ConversationId) -> bool {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        match self.pending.entry(conversation_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => return false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(PendingTimer {
                    generation,
                    token: token.clone(),
                });
            }
        }

        let engine = self.engine.clone();
        let pending = Arc::clone(&self.pending);
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Migration timer for {} cancelled", conversation_id);
                }
                _ = tokio::time::sleep(delay) => {
                    // A cancel+reschedule may have replaced this entry.
                    pending.remove_if(&conversation_id, |_, timer| timer.generation == generation);
                    if let Err(e) = engine.migrate(&conversation_id).await {
                        warn!("Scheduled migration of {} failed: {}", conversation_id, e);
                    }
                }
            }
        });

        debug!("Scheduled migration of {} in {:?}", conversation_id, self.delay);
        true
    }

    /// Disarms a pending timer. Returns `false` if none was pending.
    pub fn cancel(&self, conversation_id: &ConversationId) -> bool {
        match self.pending.remove(conversation_id) {
            Some((_, timer)) => {
                timer.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Disarms every pending timer and returns how many there were.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<ConversationId> = self.pending.iter().map(|entry| *entry.key()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    pub fn is_pending(&self, conversation_id: &ConversationId) -> bool {
        self.pending.contains_key(conversation_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
