//! # Chat Infrastructure
//! 
//! Adapters for the chat core ports: PostgreSQL durable store, Redis
//! message cache and the streaming completion relay client.

pub mod cache;
pub mod database;
pub mod llm;

pub use cache::{create_redis_pool, RedisMessageCache, RedisProbe};
pub use database::{create_pool, PgConversationRepository, PgMessageRepository, PgProbe};
pub use llm::CompletionClient;
