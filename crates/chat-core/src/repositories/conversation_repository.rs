//! Conversation repository trait (port)

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::{Conversation, ConversationId, NewConversation};
use crate::error::DomainError;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create(&self, conversation: &NewConversation) -> Result<Conversation, DomainError>;
    async fn find_by_id(&self, id: &ConversationId) -> Result<Option<Conversation>, DomainError>;
    async fn update_title(&self, id: &ConversationId, title: &str) -> Result<bool, DomainError>;
    /// Removes the conversation and every durable message that belongs to it.
    async fn delete(&self, id: &ConversationId) -> Result<bool, DomainError>;
}
