//! Cache module (Redis adapters)

pub mod connection;
pub mod redis_message_cache;

pub use connection::{create_redis_pool, RedisProbe};
pub use redis_message_cache::RedisMessageCache;
