// ============================================================================
// Chat Core - Message Service
// File: crates/chat-core/src/services/message_service.rs
// ============================================================================
//! Feedback updates that keep the durable row and the cached copy in step

use std::sync::Arc;

use tracing::{debug, info, warn};

use chat_shared::constants::CACHE_SCAN_PAGE_SIZE;

use crate::domain::{ConversationId, Message, MessageId, ThumbRating};
use crate::error::DomainError;
use crate::repositories::{MessageCache, MessageRepository};

#[derive(Clone)]
pub struct MessageService {
    messages: Arc<dyn MessageRepository>,
    cache: Arc<dyn MessageCache>,
}

impl MessageService {
    pub fn new(messages: Arc<dyn MessageRepository>, cache: Arc<dyn MessageCache>) -> Self {
        Self { messages, cache }
    }

    /// Sets feedback and rating on a message owned by `user_id`.
    ///
    /// The message may live in the durable store, the cache, or both. The
    /// cached copy is rewritten too, otherwise the next migration would
    /// overwrite the durable feedback with the stale cached record.
    pub async fn update_feedback(
        &self,
        user_id: &str,
        message_id: &MessageId,
        feedback: &str,
        thumb: ThumbRating,
    ) -> Result<Message, DomainError> {
        if let Some(stored) = self.messages.find_by_id(message_id).await? {
            if !stored.is_owned_by(user_id) {
                warn!("User {} denied feedback on message {}", user_id, message_id);
                return Err(DomainError::OwnershipMismatch(*message_id));
            }

            self.messages.update_feedback(message_id, feedback, thumb).await?;
            let updated = stored.with_feedback(feedback.to_string(), thumb);
            self.rewrite_cached(&updated.conversation_id, &updated).await?;

            info!("Feedback stored for message {}", message_id);
            return Ok(updated);
        }

        // Not migrated yet: the cache holds the only copy.
        let (conversation_id, cached) = self
            .find_in_cache(message_id)
            .await?
            .ok_or(DomainError::MessageNotFound(*message_id))?;

        if !cached.is_owned_by(user_id) {
            warn!("User {} denied feedback on message {}", user_id, message_id);
            return Err(DomainError::OwnershipMismatch(*message_id));
        }

        let updated = cached.with_feedback(feedback.to_string(), thumb);
        self.rewrite_cached(&conversation_id, &updated).await?;

        info!("Feedback stored for cached message {}", message_id);
        Ok(updated)
    }

    async fn rewrite_cached(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<(), DomainError> {
        if self.cache.replace_message(conversation_id, message).await? {
            debug!("Rewrote cached message {}", message.message_id);
        }
        Ok(())
    }

    async fn find_in_cache(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<(ConversationId, Message)>, DomainError> {
        let mut cursor = 0u64;
        loop {
            let page = self.cache.scan(cursor, CACHE_SCAN_PAGE_SIZE).await?;
            for conversation_id in page.conversation_ids {
                if let Some(message) = self.cache.find_message(&conversation_id, message_id).await? {
                    return Ok(Some((conversation_id, message)));
                }
            }
            if page.next_cursor == 0 {
                return Ok(None);
            }
            cursor = page.next_cursor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{CacheScanPage, CachedMessages};
    use crate::testing::{InMemoryMessageCache, InMemoryMessageRepository};
    use uuid::Uuid;

    fn fixture() -> (MessageService, Arc<InMemoryMessageRepository>, Arc<InMemoryMessageCache>) {
        let durable = Arc::new(InMemoryMessageRepository::new());
        let cache = Arc::new(InMemoryMessageCache::new());
        (
            MessageService::new(durable.clone(), cache.clone()),
            durable,
            cache,
        )
    }

    fn turn(user_id: &str) -> Message {
        Message::new_turn(
            user_id.to_string(),
            Uuid::new_v4(),
            "q".to_string(),
            "a".to_string(),
        )
    }

    #[tokio::test]
    async fn test_feedback_on_durable_and_cached_message() {
        let (service, durable, cache) = fixture();
        let message = turn("owner");
        durable.insert(message.clone());
        cache.append(&message.conversation_id, &message).await.unwrap();

        let updated = service
            .update_feedback("owner", &message.message_id, "great", ThumbRating::Up)
            .await
            .unwrap();

        assert_eq!(updated.feedback.as_deref(), Some("great"));
        assert_eq!(durable.all(), vec![updated.clone()]);
        assert_eq!(cache.messages(&message.conversation_id), vec![updated]);
    }

    #[tokio::test]
    async fn test_feedback_on_cache_only_message() {
        let (service, durable, cache) = fixture();
        let other = turn("owner");
        let message = turn("owner");
        cache.append(&other.conversation_id, &other).await.unwrap();
        cache.append(&message.conversation_id, &message).await.unwrap();

        service
            .update_feedback("owner", &message.message_id, "meh", ThumbRating::Down)
            .await
            .unwrap();

        let cached = cache.messages(&message.conversation_id);
        assert_eq!(cached[0].thumb, ThumbRating::Down);
        assert_eq!(cache.messages(&other.conversation_id), vec![other]);
        assert!(durable.all().is_empty());
    }

    /// Migrates the oldest cached record after every lookup, the way a
    /// timer firing between lookup and rewrite would.
    struct TrimmingCache {
        inner: Arc<InMemoryMessageCache>,
    }

    #[async_trait::async_trait]
    impl MessageCache for TrimmingCache {
        async fn exists(&self, id: &ConversationId) -> Result<bool, DomainError> {
            self.inner.exists(id).await
        }
        async fn append(&self, id: &ConversationId, message: &Message) -> Result<(), DomainError> {
            self.inner.append(id, message).await
        }
        async fn append_all(
            &self,
            id: &ConversationId,
            messages: &[Message],
        ) -> Result<(), DomainError> {
            self.inner.append_all(id, messages).await
        }
        async fn read_all(&self, id: &ConversationId) -> Result<CachedMessages, DomainError> {
            self.inner.read_all(id).await
        }
        async fn trim_front(&self, id: &ConversationId, count: usize) -> Result<(), DomainError> {
            self.inner.trim_front(id, count).await
        }
        async fn delete(&self, id: &ConversationId) -> Result<(), DomainError> {
            self.inner.delete(id).await
        }
        async fn find_message(
            &self,
            id: &ConversationId,
            message_id: &MessageId,
        ) -> Result<Option<Message>, DomainError> {
            let found = self.inner.find_message(id, message_id).await?;
            self.inner.trim_front(id, 1).await?;
            Ok(found)
        }
        async fn replace_message(
            &self,
            id: &ConversationId,
            message: &Message,
        ) -> Result<bool, DomainError> {
            self.inner.replace_message(id, message).await
        }
        async fn scan(&self, cursor: u64, page_size: usize) -> Result<CacheScanPage, DomainError> {
            self.inner.scan(cursor, page_size).await
        }
    }

    #[tokio::test]
    async fn test_feedback_survives_trim_between_lookup_and_rewrite() {
        let inner = Arc::new(InMemoryMessageCache::new());
        let service = MessageService::new(
            Arc::new(InMemoryMessageRepository::new()),
            Arc::new(TrimmingCache {
                inner: inner.clone(),
            }),
        );
        let conversation_id = Uuid::new_v4();
        let turns: Vec<Message> = ["q1", "q2", "q3"]
            .iter()
            .map(|q| {
                Message::new_turn(
                    "owner".to_string(),
                    conversation_id,
                    q.to_string(),
                    "a".to_string(),
                )
            })
            .collect();
        inner.append_all(&conversation_id, &turns).await.unwrap();

        service
            .update_feedback("owner", &turns[1].message_id, "nice", ThumbRating::Up)
            .await
            .unwrap();

        let cached = inner.messages(&conversation_id);
        let questions: Vec<&str> = cached.iter().map(|m| m.question.as_str()).collect();
        assert_eq!(questions, vec!["q2", "q3"]);
        assert_eq!(cached[0].thumb, ThumbRating::Up);
        assert_eq!(cached[1].thumb, ThumbRating::Unset);
    }

    #[tokio::test]
    async fn test_feedback_by_other_user_is_rejected() {
        let (service, durable, _cache) = fixture();
        let message = turn("owner");
        durable.insert(message.clone());

        let result = service
            .update_feedback("intruder", &message.message_id, "x", ThumbRating::Up)
            .await;

        assert!(matches!(result, Err(DomainError::OwnershipMismatch(_))));
        assert_eq!(durable.all(), vec![message]);
    }

    #[tokio::test]
    async fn test_feedback_on_unknown_message() {
        let (service, _durable, _cache) = fixture();
        let id = Uuid::new_v4();

        let result = service
            .update_feedback("owner", &id, "x", ThumbRating::Up)
            .await;

        assert!(matches!(result, Err(DomainError::MessageNotFound(m)) if m == id));
    }
}
