//! Fast-store cache trait (port)
//!
//! One ordered, append-only list of messages per conversation. The store
//! offers no transactions; every method is a single store command unless
//! documented otherwise.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::{ConversationId, Message, MessageId};
use crate::error::DomainError;

/// Decoded content of one cache entry.
#[derive(Debug, Clone, Default)]
pub struct CachedMessages {
    pub messages: Vec<Message>,
    /// Number of raw list items, including ones that failed to decode.
    pub raw_len: usize,
}

impl CachedMessages {
    pub fn is_empty(&self) -> bool {
        self.raw_len == 0
    }
}

/// One page of a cursor-based key scan. `next_cursor == 0` ends the scan.
#[derive(Debug, Clone, Default)]
pub struct CacheScanPage {
    pub next_cursor: u64,
    pub conversation_ids: Vec<ConversationId>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageCache: Send + Sync {
    async fn exists(&self, conversation_id: &ConversationId) -> Result<bool, DomainError>;

    async fn append(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<(), DomainError>;

    /// Appends every message in one command: all or nothing.
    async fn append_all(
        &self,
        conversation_id: &ConversationId,
        messages: &[Message],
    ) -> Result<(), DomainError>;

    async fn read_all(&self, conversation_id: &ConversationId)
        -> Result<CachedMessages, DomainError>;

    /// Drops the first `count` items; the entry disappears when nothing is left.
    async fn trim_front(
        &self,
        conversation_id: &ConversationId,
        count: usize,
    ) -> Result<(), DomainError>;

    async fn delete(&self, conversation_id: &ConversationId) -> Result<(), DomainError>;

    async fn find_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Option<Message>, DomainError>;

    /// Replaces the cached record carrying `message.message_id` in one
    /// atomic step, so a concurrent trim cannot redirect the write onto
    /// another record. Returns `false` when no such record is cached.
    async fn replace_message(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<bool, DomainError>;

    async fn scan(&self, cursor: u64, page_size: usize) -> Result<CacheScanPage, DomainError>;
}
