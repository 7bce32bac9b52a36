//! In-memory doubles of the stores, the relay and the session transport.
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! downstream crates.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{Conversation, ConversationId, Message, MessageId, NewConversation, ThumbRating};
use crate::error::DomainError;
use crate::providers::{CompletionProvider, RelayFragment, RelayStream};
use crate::repositories::{
    CacheScanPage, CachedMessages, ConversationRepository, MessageCache, MessageRepository,
};
use crate::services::session_service::{SessionTransport, TransportError};

fn unavailable(store: &str) -> DomainError {
    DomainError::StoreUnavailable(format!("{} is down", store))
}

// ============================================================================
// Durable store
// ============================================================================

#[derive(Default)]
pub struct InMemoryConversationRepository {
    rows: Mutex<Vec<Conversation>>,
    /// Messages removed together with a conversation.
    messages: Option<Arc<InMemoryMessageRepository>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Arc<InMemoryMessageRepository>) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            messages: Some(messages),
        }
    }

    pub fn insert(&self, conversation: Conversation) {
        self.rows.lock().push(conversation);
    }

    pub fn all(&self) -> Vec<Conversation> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn create(&self, conversation: &NewConversation) -> Result<Conversation, DomainError> {
        let created = conversation.clone().into_conversation(chat_shared::new_id());
        self.rows.lock().push(created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: &ConversationId) -> Result<Option<Conversation>, DomainError> {
        Ok(self.rows.lock().iter().find(|c| c.id == *id).cloned())
    }

    async fn update_title(&self, id: &ConversationId, title: &str) -> Result<bool, DomainError> {
        let mut rows = self.rows.lock();
        match rows.iter_mut().find(|c| c.id == *id) {
            Some(row) => {
                row.title = title.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, DomainError> {
        let removed = {
            let mut rows = self.rows.lock();
            let before = rows.len();
            rows.retain(|c| c.id != *id);
            rows.len() != before
        };
        if let Some(messages) = &self.messages {
            messages.rows.lock().retain(|m| m.conversation_id != *id);
        }
        Ok(removed)
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    rows: Mutex<Vec<Message>>,
    failing_conversations: Mutex<HashSet<ConversationId>>,
    unavailable: AtomicBool,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, message: Message) {
        self.rows.lock().push(message);
    }

    pub fn all(&self) -> Vec<Message> {
        self.rows.lock().clone()
    }

    /// Upserts of messages belonging to `conversation_id` fail from now on.
    pub fn fail_upserts_for(&self, conversation_id: ConversationId) {
        self.failing_conversations.lock().insert(conversation_id);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable("durable store"));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn find_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, DomainError> {
        self.check()?;
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|m| m.conversation_id == *conversation_id)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, message_id: &MessageId) -> Result<Option<Message>, DomainError> {
        self.check()?;
        Ok(self.rows.lock().iter().find(|m| m.message_id == *message_id).cloned())
    }

    async fn upsert(&self, message: &Message) -> Result<(), DomainError> {
        self.check()?;
        if self.failing_conversations.lock().contains(&message.conversation_id) {
            return Err(unavailable("durable store"));
        }
        let mut rows = self.rows.lock();
        match rows.iter_mut().find(|m| m.message_id == message.message_id) {
            Some(row) => *row = message.clone(),
            None => rows.push(message.clone()),
        }
        Ok(())
    }

    async fn update_feedback(
        &self,
        message_id: &MessageId,
        feedback: &str,
        thumb: ThumbRating,
    ) -> Result<bool, DomainError> {
        self.check()?;
        let mut rows = self.rows.lock();
        match rows.iter_mut().find(|m| m.message_id == *message_id) {
            Some(row) => {
                row.feedback = Some(feedback.to_string());
                row.thumb = thumb;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// Fast store
// ============================================================================

/// Cache double holding raw JSON items, like the real list store.
///
/// Scans page over the key set as it was when the scan started (cursor 0),
/// so keys deleted mid-sweep never shift later pages. A cursor packs the
/// scan id into the high 32 bits and the page offset into the low ones.
#[derive(Default)]
pub struct InMemoryMessageCache {
    entries: Mutex<BTreeMap<ConversationId, Vec<String>>>,
    scans: Mutex<HashMap<u32, Vec<ConversationId>>>,
    last_scan: AtomicU32,
    unavailable: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryMessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_raw(&self, conversation_id: ConversationId, raw: &str) {
        self.entries
            .lock()
            .entry(conversation_id)
            .or_default()
            .push(raw.to_string());
    }

    pub fn messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        self.entries
            .lock()
            .get(conversation_id)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|raw| serde_json::from_str(raw).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, conversation_id: &ConversationId) -> bool {
        self.entries.lock().contains_key(conversation_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable("cache"));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), DomainError> {
        self.check()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable("cache"));
        }
        Ok(())
    }
}

fn encode(message: &Message) -> Result<String, DomainError> {
    serde_json::to_string(message).map_err(|e| DomainError::InternalError(e.to_string()))
}

#[async_trait]
impl MessageCache for InMemoryMessageCache {
    async fn exists(&self, conversation_id: &ConversationId) -> Result<bool, DomainError> {
        self.check()?;
        Ok(self.contains(conversation_id))
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<(), DomainError> {
        self.check_write()?;
        let raw = encode(message)?;
        self.entries.lock().entry(*conversation_id).or_default().push(raw);
        Ok(())
    }

    async fn append_all(
        &self,
        conversation_id: &ConversationId,
        messages: &[Message],
    ) -> Result<(), DomainError> {
        self.check_write()?;
        let raws = messages.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
        self.entries.lock().entry(*conversation_id).or_default().extend(raws);
        Ok(())
    }

    async fn read_all(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<CachedMessages, DomainError> {
        self.check()?;
        let raw_len = self
            .entries
            .lock()
            .get(conversation_id)
            .map(Vec::len)
            .unwrap_or(0);
        Ok(CachedMessages {
            messages: self.messages(conversation_id),
            raw_len,
        })
    }

    async fn trim_front(
        &self,
        conversation_id: &ConversationId,
        count: usize,
    ) -> Result<(), DomainError> {
        self.check_write()?;
        let mut entries = self.entries.lock();
        if let Some(items) = entries.get_mut(conversation_id) {
            items.drain(..count.min(items.len()));
            if items.is_empty() {
                entries.remove(conversation_id);
            }
        }
        Ok(())
    }

    async fn delete(&self, conversation_id: &ConversationId) -> Result<(), DomainError> {
        self.check_write()?;
        self.entries.lock().remove(conversation_id);
        Ok(())
    }

    async fn find_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Option<Message>, DomainError> {
        self.check()?;
        Ok(self
            .messages(conversation_id)
            .into_iter()
            .find(|m| m.message_id == *message_id))
    }

    async fn replace_message(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<bool, DomainError> {
        self.check_write()?;
        let raw = encode(message)?;
        let mut entries = self.entries.lock();
        let slot = entries.get_mut(conversation_id).and_then(|items| {
            items.iter_mut().find(|item| {
                serde_json::from_str::<Message>(item)
                    .map(|m| m.message_id == message.message_id)
                    .unwrap_or(false)
            })
        });
        match slot {
            Some(slot) => {
                *slot = raw;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan(&self, cursor: u64, page_size: usize) -> Result<CacheScanPage, DomainError> {
        self.check()?;
        let (scan_id, start) = if cursor == 0 {
            let scan_id = self.last_scan.fetch_add(1, Ordering::SeqCst) + 1;
            let keys = self.entries.lock().keys().copied().collect();
            self.scans.lock().insert(scan_id, keys);
            (scan_id, 0usize)
        } else {
            ((cursor >> 32) as u32, (cursor & u64::from(u32::MAX)) as usize)
        };

        let mut scans = self.scans.lock();
        let keys = scans
            .get(&scan_id)
            .ok_or_else(|| DomainError::InternalError(format!("unknown scan cursor {}", cursor)))?;
        let total = keys.len();
        let end = (start + page_size).min(total);
        let entries = self.entries.lock();
        let conversation_ids = keys[start.min(end)..end]
            .iter()
            .filter(|id| entries.contains_key(id))
            .copied()
            .collect();
        drop(entries);

        let next_cursor = if end >= total {
            scans.remove(&scan_id);
            0
        } else {
            (u64::from(scan_id) << 32) | end as u64
        };
        Ok(CacheScanPage {
            next_cursor,
            conversation_ids,
        })
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Replays the same fragments for every call and records the prompts.
#[derive(Default)]
pub struct ScriptedRelay {
    fragments: Vec<RelayFragment>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedRelay {
    pub fn new(fragments: Vec<RelayFragment>) -> Self {
        Self {
            fragments,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn deltas(parts: &[&str]) -> Self {
        Self::new(
            parts
                .iter()
                .map(|p| RelayFragment::Delta(p.to_string()))
                .collect(),
        )
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl CompletionProvider for ScriptedRelay {
    fn stream(&self, _conversation_id: &ConversationId, prompt: &str) -> RelayStream {
        self.prompts.lock().push(prompt.to_string());
        Box::pin(futures::stream::iter(self.fragments.clone()))
    }
}

// ============================================================================
// Transport
// ============================================================================

/// What a [`ScriptedTransport`] observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Read,
    Sent(String),
}

/// Transport double: serves queued inbound texts, then reports a close.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inbound: Arc<Mutex<VecDeque<String>>>,
    events: Arc<Mutex<Vec<TransportEvent>>>,
    /// Sends fail once this many frames went out.
    send_limit: Option<usize>,
}

impl ScriptedTransport {
    pub fn new(inbound: &[&str]) -> Self {
        Self {
            inbound: Arc::new(Mutex::new(inbound.iter().map(|s| s.to_string()).collect())),
            events: Arc::new(Mutex::new(Vec::new())),
            send_limit: None,
        }
    }

    pub fn failing_after(mut self, sent_frames: usize) -> Self {
        self.send_limit = Some(sent_frames);
        self
    }

    pub fn events(&self) -> Vec<TransportEvent> {
        self.events.lock().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Sent(text) => Some(text.clone()),
                TransportEvent::Read => None,
            })
            .collect()
    }
}

#[async_trait]
impl SessionTransport for ScriptedTransport {
    async fn recv_text(&mut self) -> Result<Option<String>, TransportError> {
        self.events.lock().push(TransportEvent::Read);
        Ok(self.inbound.lock().pop_front())
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let mut events = self.events.lock();
        let sent = events
            .iter()
            .filter(|e| matches!(e, TransportEvent::Sent(_)))
            .count();
        if self.send_limit.is_some_and(|limit| sent >= limit) {
            return Err(TransportError("connection reset".to_string()));
        }
        events.push(TransportEvent::Sent(text));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn turn(conversation_id: ConversationId, question: &str) -> Message {
        Message::new_turn(
            "user-1".to_string(),
            conversation_id,
            question.to_string(),
            "a".to_string(),
        )
    }

    #[tokio::test]
    async fn test_scan_keeps_pages_stable_when_keys_are_deleted() {
        let cache = InMemoryMessageCache::new();
        let ids: Vec<ConversationId> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            cache.append(id, &turn(*id, "q")).await.unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor = 0;
        loop {
            let page = cache.scan(cursor, 2).await.unwrap();
            for id in page.conversation_ids {
                cache.delete(&id).await.unwrap();
                seen.push(id);
            }
            if page.next_cursor == 0 {
                break;
            }
            cursor = page.next_cursor;
        }

        seen.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(seen, expected);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_replace_message_matches_on_id_not_position() {
        let cache = InMemoryMessageCache::new();
        let conversation_id = Uuid::new_v4();
        let first = turn(conversation_id, "q1");
        let second = turn(conversation_id, "q2");
        cache.append(&conversation_id, &first).await.unwrap();
        cache.append(&conversation_id, &second).await.unwrap();
        cache.trim_front(&conversation_id, 1).await.unwrap();

        let rated = second.clone().with_feedback("ok".to_string(), ThumbRating::Up);
        assert!(cache.replace_message(&conversation_id, &rated).await.unwrap());
        assert!(!cache.replace_message(&conversation_id, &first).await.unwrap());

        assert_eq!(cache.messages(&conversation_id), vec![rated]);
    }
}
