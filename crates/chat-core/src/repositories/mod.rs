//! Repository traits (ports)

pub mod conversation_repository;
pub mod message_repository;
pub mod message_cache;

pub use conversation_repository::ConversationRepository;
pub use message_repository::MessageRepository;
pub use message_cache::{CacheScanPage, CachedMessages, MessageCache};
