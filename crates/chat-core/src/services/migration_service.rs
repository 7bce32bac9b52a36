// ============================================================================
// Chat Core - Cache Migration Engine
// File: crates/chat-core/src/services/migration_service.rs
// Description: Moves conversations between the fast cache and the durable store
// ============================================================================
//! Hydration (durable -> cache) and migration (cache -> durable).
//!
//! Migration upserts by message id and only then trims the migrated prefix
//! of the cache entry, so a failure at any point leaves the data cached and
//! a rerun converges on the same durable rows.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use chat_shared::constants::CACHE_SCAN_PAGE_SIZE;

use crate::domain::{ConversationId, Message};
use crate::error::DomainError;
use crate::repositories::{MessageCache, MessageRepository};

/// Outcome of a bulk sweep over every cached conversation.
#[derive(Debug, Default)]
pub struct MigrationSummary {
    /// Conversations whose cache entry was drained.
    pub migrated: usize,
    /// Records upserted across all drained conversations.
    pub records: usize,
    pub failed: Vec<(ConversationId, DomainError)>,
    /// Set when key enumeration itself broke off; the sweep is then partial.
    pub scan_error: Option<DomainError>,
}

impl MigrationSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.scan_error.is_none()
    }
}

#[derive(Clone)]
pub struct MigrationEngine {
    messages: Arc<dyn MessageRepository>,
    cache: Arc<dyn MessageCache>,
}

impl MigrationEngine {
    pub fn new(messages: Arc<dyn MessageRepository>, cache: Arc<dyn MessageCache>) -> Self {
        Self { messages, cache }
    }

    /// Returns the conversation's messages in chronological order, filling
    /// the cache from the durable store when no entry exists yet.
    ///
    /// A failed cache fill is logged and the fetched data is still returned;
    /// the fill is a single all-or-nothing append, so the cache stays empty
    /// and the next call retries it.
    pub async fn hydrate_or_fetch(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, DomainError> {
        if self.cache.exists(conversation_id).await? {
            let cached = self.cache.read_all(conversation_id).await?;
            debug!(
                "Hydration of {} served {} cached messages",
                conversation_id,
                cached.messages.len()
            );
            return Ok(cached.messages);
        }

        let messages = self.messages.find_by_conversation(conversation_id).await?;
        if messages.is_empty() {
            return Ok(messages);
        }

        if let Err(e) = self.cache.append_all(conversation_id, &messages).await {
            warn!(
                "Cache fill for conversation {} failed, serving durable data: {}",
                conversation_id, e
            );
        } else {
            debug!(
                "Hydrated conversation {} with {} durable messages",
                conversation_id,
                messages.len()
            );
        }

        Ok(messages)
    }

    /// Drains one conversation's cache entry into the durable store and
    /// returns the number of records upserted. An empty entry is a no-op.
    pub async fn migrate(&self, conversation_id: &ConversationId) -> Result<usize, DomainError> {
        let cached = self.cache.read_all(conversation_id).await?;
        if cached.is_empty() {
            return Ok(0);
        }

        let skipped = cached.raw_len - cached.messages.len();
        if skipped > 0 {
            warn!(
                "Dropping {} undecodable cached records of conversation {}",
                skipped, conversation_id
            );
        }

        for message in &cached.messages {
            self.messages.upsert(message).await.map_err(|e| {
                error!(
                    "Upsert of message {} (conversation {}) failed: {}",
                    message.message_id, conversation_id, e
                );
                DomainError::MigrationFailed {
                    conversation_id: *conversation_id,
                    reason: e.to_string(),
                }
            })?;
        }

        // Only the prefix read above is removed; turns appended meanwhile stay.
        self.cache
            .trim_front(conversation_id, cached.raw_len)
            .await
            .map_err(|e| DomainError::MigrationFailed {
                conversation_id: *conversation_id,
                reason: e.to_string(),
            })?;

        info!(
            "Migrated {} messages of conversation {}",
            cached.messages.len(),
            conversation_id
        );
        Ok(cached.messages.len())
    }

    /// Migrates every cached conversation, page by page. One failure never
    /// stops the sweep.
    pub async fn migrate_all(&self) -> MigrationSummary {
        let mut summary = MigrationSummary::default();
        let mut seen = HashSet::new();
        let mut cursor = 0u64;

        loop {
            let page = match self.cache.scan(cursor, CACHE_SCAN_PAGE_SIZE).await {
                Ok(page) => page,
                Err(e) => {
                    error!("Cache key scan failed at cursor {}: {}", cursor, e);
                    summary.scan_error = Some(e);
                    break;
                }
            };

            for conversation_id in page.conversation_ids {
                // Cursor scans may return a key more than once.
                if !seen.insert(conversation_id) {
                    continue;
                }
                match self.migrate(&conversation_id).await {
                    Ok(records) => {
                        summary.migrated += 1;
                        summary.records += records;
                    }
                    Err(e) => {
                        error!("Migration of conversation {} failed: {}", conversation_id, e);
                        summary.failed.push((conversation_id, e));
                    }
                }
            }

            if page.next_cursor == 0 {
                break;
            }
            cursor = page.next_cursor;
        }

        info!(
            "Bulk migration finished: {} conversations, {} records, {} failures",
            summary.migrated,
            summary.records,
            summary.failed.len()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::message_cache::MockMessageCache;
    use crate::repositories::message_repository::MockMessageRepository;
    use crate::repositories::CacheScanPage;
    use crate::testing::{InMemoryMessageCache, InMemoryMessageRepository};
    use chrono::{Duration, SubsecRound, Utc};
    use uuid::Uuid;

    fn turn(conversation_id: ConversationId, n: i64) -> Message {
        let mut message = Message::new_turn(
            "user-1".to_string(),
            conversation_id,
            format!("question {}", n),
            format!("answer {}", n),
        );
        message.created_at = (Utc::now() + Duration::seconds(n)).trunc_subsecs(6);
        message
    }

    fn engine() -> (
        MigrationEngine,
        Arc<InMemoryMessageRepository>,
        Arc<InMemoryMessageCache>,
    ) {
        let durable = Arc::new(InMemoryMessageRepository::new());
        let cache = Arc::new(InMemoryMessageCache::new());
        (
            MigrationEngine::new(durable.clone(), cache.clone()),
            durable,
            cache,
        )
    }

    #[tokio::test]
    async fn test_hydrate_from_durable_keeps_order_and_fills_cache() {
        let (engine, durable, cache) = engine();
        let conversation_id = Uuid::new_v4();
        let history: Vec<Message> = (1..=3).map(|n| turn(conversation_id, n)).collect();
        history.iter().cloned().for_each(|m| durable.insert(m));

        let hydrated = engine.hydrate_or_fetch(&conversation_id).await.unwrap();

        assert_eq!(hydrated, history);
        assert_eq!(cache.messages(&conversation_id), history);
    }

    #[tokio::test]
    async fn test_hydrate_prefers_existing_cache_entry() {
        let (engine, durable, cache) = engine();
        let conversation_id = Uuid::new_v4();
        durable.insert(turn(conversation_id, 1));
        let cached = turn(conversation_id, 2);
        cache.append(&conversation_id, &cached).await.unwrap();

        let hydrated = engine.hydrate_or_fetch(&conversation_id).await.unwrap();

        assert_eq!(hydrated, vec![cached]);
    }

    #[tokio::test]
    async fn test_hydrate_returns_data_when_cache_fill_fails() {
        let (engine, durable, cache) = engine();
        let conversation_id = Uuid::new_v4();
        let message = turn(conversation_id, 1);
        durable.insert(message.clone());
        cache.set_fail_writes(true);

        let hydrated = engine.hydrate_or_fetch(&conversation_id).await.unwrap();

        assert_eq!(hydrated, vec![message]);
        assert!(!cache.contains(&conversation_id));
    }

    #[tokio::test]
    async fn test_hydrate_unavailable_durable_store() {
        let (engine, durable, _cache) = engine();
        durable.set_unavailable(true);

        let result = engine.hydrate_or_fetch(&Uuid::new_v4()).await;

        assert!(matches!(result, Err(DomainError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_migrate_twice_is_idempotent() {
        let (engine, durable, cache) = engine();
        let conversation_id = Uuid::new_v4();
        for n in 1..=2 {
            cache.append(&conversation_id, &turn(conversation_id, n)).await.unwrap();
        }

        assert_eq!(engine.migrate(&conversation_id).await.unwrap(), 2);
        let after_first = durable.all();
        assert_eq!(engine.migrate(&conversation_id).await.unwrap(), 0);

        assert_eq!(durable.all(), after_first);
        assert!(!cache.contains(&conversation_id));
    }

    #[tokio::test]
    async fn test_migrate_upserts_instead_of_duplicating() {
        let (engine, durable, cache) = engine();
        let conversation_id = Uuid::new_v4();
        let message = turn(conversation_id, 1);
        durable.insert(message.clone());
        let rated = message.with_feedback("useful".to_string(), crate::domain::ThumbRating::Up);
        cache.append(&conversation_id, &rated).await.unwrap();

        engine.migrate(&conversation_id).await.unwrap();

        assert_eq!(durable.all(), vec![rated]);
    }

    #[tokio::test]
    async fn test_failed_upsert_leaves_cache_intact() {
        let (engine, durable, cache) = engine();
        let conversation_id = Uuid::new_v4();
        let message = turn(conversation_id, 1);
        cache.append(&conversation_id, &message).await.unwrap();
        durable.fail_upserts_for(conversation_id);

        let result = engine.migrate(&conversation_id).await;

        assert!(matches!(
            result,
            Err(DomainError::MigrationFailed { conversation_id: id, .. }) if id == conversation_id
        ));
        assert_eq!(cache.messages(&conversation_id), vec![message]);
    }

    #[tokio::test]
    async fn test_migrate_drops_undecodable_records() {
        let (engine, durable, cache) = engine();
        let conversation_id = Uuid::new_v4();
        cache.push_raw(conversation_id, "{not json");
        let message = turn(conversation_id, 1);
        cache.append(&conversation_id, &message).await.unwrap();

        assert_eq!(engine.migrate(&conversation_id).await.unwrap(), 1);

        assert_eq!(durable.all(), vec![message]);
        assert!(!cache.contains(&conversation_id));
    }

    #[tokio::test]
    async fn test_migrate_only_trims_what_was_read() {
        let conversation_id = Uuid::new_v4();
        let message = turn(conversation_id, 1);
        let read = message.clone();

        let mut cache = MockMessageCache::new();
        cache.expect_read_all().times(1).returning(move |_| {
            Ok(crate::repositories::CachedMessages {
                messages: vec![read.clone()],
                raw_len: 1,
            })
        });
        cache
            .expect_trim_front()
            .withf(|_, count| *count == 1)
            .times(1)
            .returning(|_, _| Ok(()));
        cache.expect_delete().times(0);

        let mut durable = MockMessageRepository::new();
        durable.expect_upsert().times(1).returning(|_| Ok(()));

        let engine = MigrationEngine::new(Arc::new(durable), Arc::new(cache));
        assert_eq!(engine.migrate(&conversation_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_migrate_all_continues_past_failures() {
        let (engine, durable, cache) = engine();
        let ids: Vec<ConversationId> = (0..3).map(|_| Uuid::new_v4()).collect();
        for (n, id) in ids.iter().enumerate() {
            cache.append(id, &turn(*id, n as i64)).await.unwrap();
        }
        let broken = ids[1];
        durable.fail_upserts_for(broken);

        let summary = engine.migrate_all().await;

        assert_eq!(summary.migrated, 2);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, broken);
        assert!(summary.scan_error.is_none());
        assert!(cache.contains(&broken));
        assert!(!cache.contains(&ids[0]) && !cache.contains(&ids[2]));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_migrate_all_follows_cursor_and_skips_repeated_keys() {
        let (engine, _durable, cache) = engine();
        // More keys than one scan page.
        let total = CACHE_SCAN_PAGE_SIZE + 5;
        for n in 0..total {
            let id = Uuid::new_v4();
            cache.append(&id, &turn(id, n as i64)).await.unwrap();
        }

        let summary = engine.migrate_all().await;

        assert_eq!(summary.migrated, total);
        assert!(summary.is_clean());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_migrate_all_reports_scan_failure() {
        let mut cache = MockMessageCache::new();
        let id = Uuid::new_v4();
        cache
            .expect_scan()
            .withf(|cursor, _| *cursor == 0)
            .returning(move |_, _| {
                Ok(CacheScanPage {
                    next_cursor: 7,
                    conversation_ids: vec![id, id],
                })
            });
        cache
            .expect_scan()
            .withf(|cursor, _| *cursor == 7)
            .returning(|_, _| Err(DomainError::StoreUnavailable("reset".to_string())));
        // The duplicated key is migrated once.
        cache
            .expect_read_all()
            .times(1)
            .returning(|_| Ok(Default::default()));

        let engine = MigrationEngine::new(Arc::new(MockMessageRepository::new()), Arc::new(cache));
        let summary = engine.migrate_all().await;

        assert_eq!(summary.migrated, 1);
        assert!(matches!(summary.scan_error, Some(DomainError::StoreUnavailable(_))));
    }
}
