// ============================================================================
// Chat Core - Conversation Service
// File: crates/chat-core/src/services/conversation_service.rs
// ============================================================================
//! Conversation creation, lookup with ownership checks, rename and delete

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{Conversation, ConversationId, NewConversation};
use crate::error::DomainError;
use crate::repositories::{ConversationRepository, MessageCache};
use crate::services::migration_scheduler::MigrationScheduler;

#[derive(Clone)]
pub struct ConversationService {
    conversations: Arc<dyn ConversationRepository>,
    cache: Arc<dyn MessageCache>,
    scheduler: Arc<MigrationScheduler>,
    default_title: String,
}

impl ConversationService {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        cache: Arc<dyn MessageCache>,
        scheduler: Arc<MigrationScheduler>,
        default_title: String,
    ) -> Self {
        Self {
            conversations,
            cache,
            scheduler,
            default_title,
        }
    }

    /// Creates a conversation owned by `user_id`. A missing or blank title
    /// falls back to the configured default.
    pub async fn create(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<Conversation, DomainError> {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.default_title);

        let new_conversation = NewConversation::new(user_id.to_string(), title)?;
        let conversation = self.conversations.create(&new_conversation).await?;

        info!("Conversation {} created for user {}", conversation.id, user_id);
        Ok(conversation)
    }

    /// Loads a conversation, failing unless `user_id` owns it.
    pub async fn get_owned(
        &self,
        user_id: &str,
        id: &ConversationId,
    ) -> Result<Conversation, DomainError> {
        let conversation = self
            .conversations
            .find_by_id(id)
            .await?
            .ok_or(DomainError::ConversationNotFound(*id))?;

        if !conversation.is_owned_by(user_id) {
            warn!("User {} denied access to conversation {}", user_id, id);
            return Err(DomainError::OwnershipMismatch(*id));
        }

        Ok(conversation)
    }

    pub async fn rename(
        &self,
        user_id: &str,
        id: &ConversationId,
        title: &str,
    ) -> Result<Conversation, DomainError> {
        let mut conversation = self.get_owned(user_id, id).await?;

        // Reuse creation rules for the title.
        let validated = NewConversation::new(user_id.to_string(), title)?;
        if !self.conversations.update_title(id, &validated.title).await? {
            return Err(DomainError::ConversationNotFound(*id));
        }

        conversation.title = validated.title;
        info!("Conversation {} renamed", id);
        Ok(conversation)
    }

    /// Deletes the conversation everywhere. The timer is cancelled and the
    /// cache entry dropped before durable rows go, so no migration can
    /// resurrect the deleted messages.
    pub async fn delete(&self, user_id: &str, id: &ConversationId) -> Result<(), DomainError> {
        self.get_owned(user_id, id).await?;

        self.scheduler.cancel(id);
        self.cache.delete(id).await?;
        if !self.conversations.delete(id).await? {
            return Err(DomainError::ConversationNotFound(*id));
        }

        info!("Conversation {} deleted by user {}", id, user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Message;
    use crate::repositories::conversation_repository::MockConversationRepository;
    use crate::repositories::MessageRepository;
    use crate::services::migration_service::MigrationEngine;
    use crate::testing::{
        InMemoryConversationRepository, InMemoryMessageCache, InMemoryMessageRepository,
    };
    use std::time::Duration;
    use uuid::Uuid;

    struct Fixture {
        service: ConversationService,
        conversations: Arc<InMemoryConversationRepository>,
        durable: Arc<InMemoryMessageRepository>,
        cache: Arc<InMemoryMessageCache>,
        scheduler: Arc<MigrationScheduler>,
    }

    fn fixture() -> Fixture {
        let durable = Arc::new(InMemoryMessageRepository::new());
        let conversations = Arc::new(InMemoryConversationRepository::with_messages(durable.clone()));
        let cache = Arc::new(InMemoryMessageCache::new());
        let engine = MigrationEngine::new(durable.clone(), cache.clone());
        let scheduler = Arc::new(MigrationScheduler::new(engine, Duration::from_secs(1800)));
        let service = ConversationService::new(
            conversations.clone(),
            cache.clone(),
            scheduler.clone(),
            "New Conversation".to_string(),
        );
        Fixture {
            service,
            conversations,
            durable,
            cache,
            scheduler,
        }
    }

    #[tokio::test]
    async fn test_create_defaults_blank_title() {
        let f = fixture();

        let conversation = f.service.create("user-1", Some("   ")).await.unwrap();

        assert_eq!(conversation.title, "New Conversation");
        assert_eq!(conversation.user_id, "user-1");
        assert_eq!(f.conversations.all(), vec![conversation]);
    }

    #[tokio::test]
    async fn test_create_rejects_too_long_title() {
        let f = fixture();
        let title = "x".repeat(201);

        let result = f.service.create("user-1", Some(&title)).await;

        assert!(matches!(result, Err(DomainError::ValidationError(_))));
        assert!(f.conversations.all().is_empty());
    }

    #[tokio::test]
    async fn test_get_owned_enforces_owner() {
        let f = fixture();
        let conversation = f.service.create("owner", None).await.unwrap();

        let denied = f.service.get_owned("intruder", &conversation.id).await;
        let missing = f.service.get_owned("owner", &Uuid::new_v4()).await;

        assert!(matches!(denied, Err(DomainError::OwnershipMismatch(id)) if id == conversation.id));
        assert!(matches!(missing, Err(DomainError::ConversationNotFound(_))));
    }

    #[tokio::test]
    async fn test_rename_trims_and_persists() {
        let f = fixture();
        let conversation = f.service.create("owner", None).await.unwrap();

        let renamed = f
            .service
            .rename("owner", &conversation.id, "  Trip plans ")
            .await
            .unwrap();

        assert_eq!(renamed.title, "Trip plans");
        assert_eq!(f.conversations.all()[0].title, "Trip plans");
    }

    #[tokio::test]
    async fn test_rename_by_other_user_never_writes() {
        let id = Uuid::new_v4();
        let mut repo = MockConversationRepository::new();
        repo.expect_find_by_id().returning(move |_| {
            Ok(Some(Conversation {
                id,
                user_id: "owner".to_string(),
                title: "t".to_string(),
                created_at: chrono::Utc::now(),
            }))
        });
        repo.expect_update_title().times(0);

        let cache = Arc::new(InMemoryMessageCache::new());
        let engine = MigrationEngine::new(Arc::new(InMemoryMessageRepository::new()), cache.clone());
        let service = ConversationService::new(
            Arc::new(repo),
            cache,
            Arc::new(MigrationScheduler::new(engine, Duration::from_secs(1800))),
            "New Conversation".to_string(),
        );

        let result = service.rename("intruder", &id, "mine now").await;
        assert!(matches!(result, Err(DomainError::OwnershipMismatch(_))));
    }

    #[tokio::test]
    async fn test_delete_clears_cache_timer_and_durable_rows() {
        let f = fixture();
        let conversation = f.service.create("owner", None).await.unwrap();
        let message = Message::new_turn(
            "owner".to_string(),
            conversation.id,
            "q".to_string(),
            "a".to_string(),
        );
        f.durable.upsert(&message).await.unwrap();
        f.cache.append(&conversation.id, &message).await.unwrap();
        f.scheduler.schedule(conversation.id);

        f.service.delete("owner", &conversation.id).await.unwrap();

        assert!(!f.scheduler.is_pending(&conversation.id));
        assert!(!f.cache.contains(&conversation.id));
        assert!(f.durable.all().is_empty());
        assert!(f.conversations.all().is_empty());
    }
}
