//! Application-wide constants

use std::time::Duration;

/// Prefix of every cache entry key: `messages:<conversationID>`.
pub const CACHE_KEY_PREFIX: &str = "messages:";
pub const CACHE_KEY_PATTERN: &str = "messages:*";
pub const CACHE_SCAN_PAGE_SIZE: usize = 100;

/// Delay between first population of a cache entry and its scheduled migration.
pub const MIGRATION_DELAY: Duration = Duration::from_secs(30 * 60);

pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LLM_MODEL: &str = "gpt-4";
