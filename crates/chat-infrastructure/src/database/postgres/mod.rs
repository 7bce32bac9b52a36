//! PostgreSQL repository implementations

pub mod conversation_repo_impl;
pub mod message_repo_impl;

pub use conversation_repo_impl::PgConversationRepository;
pub use message_repo_impl::PgMessageRepository;
