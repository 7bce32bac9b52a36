// ============================================================================
// Chat Core - Conversation Entity
// File: crates/chat-core/src/domain/conversation.rs
// ============================================================================

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use chat_shared::UserId;

pub type ConversationId = Uuid;

/// Conversation entity. `id` and `user_id` never change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: UserId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Conversation that has not been stored yet; the durable store assigns the id.
#[derive(Debug, Clone, Validate)]
pub struct NewConversation {
    #[validate(length(min = 1, message = "Owner is required"))]
    pub user_id: UserId,

    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,

    pub created_at: DateTime<Utc>,
}

impl NewConversation {
    pub fn new(user_id: UserId, title: &str) -> Result<Self, validator::ValidationErrors> {
        let conversation = Self {
            user_id,
            title: title.trim().to_string(),
            // Postgres keeps microseconds; trimming here keeps stored and
            // in-memory values comparable.
            created_at: Utc::now().trunc_subsecs(6),
        };

        conversation.validate()?;
        Ok(conversation)
    }

    pub fn into_conversation(self, id: ConversationId) -> Conversation {
        Conversation {
            id,
            user_id: self.user_id,
            title: self.title,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_conversation() {
        let conversation = NewConversation::new("user-1".to_string(), "  Trip planning ");
        assert!(conversation.is_ok());
        assert_eq!(conversation.unwrap().title, "Trip planning");
    }

    #[test]
    fn test_rejects_blank_title() {
        assert!(NewConversation::new("user-1".to_string(), "   ").is_err());
    }

    #[test]
    fn test_rejects_missing_owner() {
        assert!(NewConversation::new(String::new(), "Title").is_err());
    }

    #[test]
    fn test_ownership() {
        let conversation = NewConversation::new("user-1".to_string(), "Title")
            .unwrap()
            .into_conversation(Uuid::new_v4());
        assert!(conversation.is_owned_by("user-1"));
        assert!(!conversation.is_owned_by("user-2"));
    }
}
