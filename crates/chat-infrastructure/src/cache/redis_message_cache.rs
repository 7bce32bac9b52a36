// ============================================================================
// Chat Infrastructure - Redis Message Cache
// File: crates/chat-infrastructure/src/cache/redis_message_cache.rs
// Description: One Redis list of JSON messages per conversation
// ============================================================================

use async_trait::async_trait;
use deadpool_redis::redis::{cmd, Script};
use deadpool_redis::{Connection, Pool};
use tracing::{error, warn};

use chat_core::domain::{ConversationId, Message, MessageId};
use chat_core::error::DomainError;
use chat_core::repositories::{CacheScanPage, CachedMessages, MessageCache};
use chat_shared::constants::{CACHE_KEY_PATTERN, CACHE_KEY_PREFIX};

pub fn cache_key(conversation_id: &ConversationId) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, conversation_id)
}

/// Conversation id of a cache key, `None` for foreign keys under the prefix.
pub fn parse_cache_key(key: &str) -> Option<ConversationId> {
    key.strip_prefix(CACHE_KEY_PREFIX)?.parse().ok()
}

/// Decodes raw list items; undecodable items are skipped but still counted.
fn decode_items(conversation_id: &ConversationId, raw: Vec<String>) -> CachedMessages {
    let raw_len = raw.len();
    let messages = raw
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_str::<Message>(item) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(
                    "Skipping malformed cached record {} of conversation {}: {}",
                    index, conversation_id, e
                );
                None
            }
        })
        .collect();

    CachedMessages { messages, raw_len }
}

fn encode(message: &Message) -> Result<String, DomainError> {
    serde_json::to_string(message).map_err(|e| DomainError::InternalError(e.to_string()))
}

fn redis_error(operation: &str, e: impl std::fmt::Display) -> DomainError {
    error!("Redis {} failed: {}", operation, e);
    DomainError::StoreUnavailable(format!("redis {}: {}", operation, e))
}

/// Finds the list item whose `message_id` equals ARGV[1] and overwrites it
/// with ARGV[2], all inside the server. Returns 1 on a hit, 0 otherwise.
const REPLACE_MESSAGE_LUA: &str = r#"
local items = redis.call('LRANGE', KEYS[1], 0, -1)
for index, item in ipairs(items) do
  local ok, decoded = pcall(cjson.decode, item)
  if ok and type(decoded) == 'table' and decoded['message_id'] == ARGV[1] then
    redis.call('LSET', KEYS[1], index - 1, ARGV[2])
    return 1
  end
end
return 0
"#;

pub struct RedisMessageCache {
    pool: Pool,
    replace_script: Script,
}

impl RedisMessageCache {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            replace_script: Script::new(REPLACE_MESSAGE_LUA),
        }
    }

    async fn connection(&self) -> Result<Connection, DomainError> {
        self.pool.get().await.map_err(|e| redis_error("connection", e))
    }
}

#[async_trait]
impl MessageCache for RedisMessageCache {
    async fn exists(&self, conversation_id: &ConversationId) -> Result<bool, DomainError> {
        let mut conn = self.connection().await?;
        let count: i64 = cmd("EXISTS")
            .arg(cache_key(conversation_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("EXISTS", e))?;
        Ok(count > 0)
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<(), DomainError> {
        let item = encode(message)?;
        let mut conn = self.connection().await?;
        cmd("RPUSH")
            .arg(cache_key(conversation_id))
            .arg(item)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| redis_error("RPUSH", e))?;
        Ok(())
    }

    async fn append_all(
        &self,
        conversation_id: &ConversationId,
        messages: &[Message],
    ) -> Result<(), DomainError> {
        if messages.is_empty() {
            return Ok(());
        }
        let items = messages.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
        let mut conn = self.connection().await?;
        // One variadic RPUSH: the list gets all items or none.
        cmd("RPUSH")
            .arg(cache_key(conversation_id))
            .arg(items)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| redis_error("RPUSH", e))?;
        Ok(())
    }

    async fn read_all(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<CachedMessages, DomainError> {
        let mut conn = self.connection().await?;
        let raw: Vec<String> = cmd("LRANGE")
            .arg(cache_key(conversation_id))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("LRANGE", e))?;
        Ok(decode_items(conversation_id, raw))
    }

    async fn trim_front(
        &self,
        conversation_id: &ConversationId,
        count: usize,
    ) -> Result<(), DomainError> {
        if count == 0 {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        // Redis removes the key once the list is empty.
        cmd("LTRIM")
            .arg(cache_key(conversation_id))
            .arg(count)
            .arg(-1)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| redis_error("LTRIM", e))
    }

    async fn delete(&self, conversation_id: &ConversationId) -> Result<(), DomainError> {
        let mut conn = self.connection().await?;
        cmd("DEL")
            .arg(cache_key(conversation_id))
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| redis_error("DEL", e))?;
        Ok(())
    }

    async fn find_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Option<Message>, DomainError> {
        let mut conn = self.connection().await?;
        let raw: Vec<String> = cmd("LRANGE")
            .arg(cache_key(conversation_id))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("LRANGE", e))?;

        Ok(raw
            .iter()
            .filter_map(|item| serde_json::from_str::<Message>(item).ok())
            .find(|m| m.message_id == *message_id))
    }

    async fn replace_message(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<bool, DomainError> {
        let item = encode(message)?;
        let mut conn = self.connection().await?;
        let replaced: i64 = self
            .replace_script
            .key(cache_key(conversation_id))
            .arg(message.message_id.to_string())
            .arg(item)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("EVALSHA", e))?;
        Ok(replaced == 1)
    }

    async fn scan(&self, cursor: u64, page_size: usize) -> Result<CacheScanPage, DomainError> {
        let mut conn = self.connection().await?;
        let (next_cursor, keys): (u64, Vec<String>) = cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(CACHE_KEY_PATTERN)
            .arg("COUNT")
            .arg(page_size)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("SCAN", e))?;

        let conversation_ids = keys
            .iter()
            .filter_map(|key| {
                let id = parse_cache_key(key);
                if id.is_none() {
                    warn!("Ignoring cache key with foreign format: {}", key);
                }
                id
            })
            .collect();

        Ok(CacheScanPage {
            next_cursor,
            conversation_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_cache_key_format() {
        let id = Uuid::parse_str("6f1c1b9e-2a7d-4c1e-9f0a-3b2d1c4e5f60").unwrap();

        assert_eq!(cache_key(&id), "messages:6f1c1b9e-2a7d-4c1e-9f0a-3b2d1c4e5f60");
        assert_eq!(parse_cache_key(&cache_key(&id)), Some(id));
    }

    #[test]
    fn test_parse_rejects_foreign_keys() {
        assert_eq!(parse_cache_key("messages:not-a-uuid"), None);
        assert_eq!(parse_cache_key("sessions:6f1c1b9e-2a7d-4c1e-9f0a-3b2d1c4e5f60"), None);
    }

    #[test]
    fn test_decode_skips_malformed_items_but_counts_them() {
        let conversation_id = Uuid::new_v4();
        let message = Message::new_turn(
            "user-1".to_string(),
            conversation_id,
            "q".to_string(),
            "a".to_string(),
        );
        let raw = vec![
            "garbage".to_string(),
            serde_json::to_string(&message).unwrap(),
        ];

        let decoded = decode_items(&conversation_id, raw);

        assert_eq!(decoded.raw_len, 2);
        assert_eq!(decoded.messages, vec![message]);
    }
}
