//! Durable message repository trait (port)

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::{ConversationId, Message, MessageId, ThumbRating};
use crate::error::DomainError;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// All messages of a conversation in insertion order.
    async fn find_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, DomainError>;

    async fn find_by_id(&self, message_id: &MessageId) -> Result<Option<Message>, DomainError>;

    /// Insert or fully replace the record keyed by `message.message_id`.
    async fn upsert(&self, message: &Message) -> Result<(), DomainError>;

    async fn update_feedback(
        &self,
        message_id: &MessageId,
        feedback: &str,
        thumb: ThumbRating,
    ) -> Result<bool, DomainError>;
}
