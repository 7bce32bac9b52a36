// ============================================================================
// Chat Core - Session Controller
// File: crates/chat-core/src/services/session_service.rs
// Description: One live chat session: resolve, hydrate, replay, stream, close
// ============================================================================
//! Session lifecycle: `Connecting -> Resolved -> Streaming* -> Closing -> Closed`.
//!
//! Resolution (identity and ownership) is split from [`ResolvedSession::run`]
//! so the transport layer can refuse a connection before upgrading it.
//! Inside `run`, turns are strictly sequential: a turn's relay stream is
//! drained completely before the next inbound read.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use chat_shared::UserId;

use crate::domain::{Conversation, ConversationId, Message};
use crate::error::DomainError;
use crate::providers::{CompletionProvider, RelayFragment};
use crate::repositories::MessageCache;
use crate::services::conversation_service::ConversationService;
use crate::services::migration_scheduler::MigrationScheduler;
use crate::services::migration_service::MigrationEngine;

#[derive(Debug, Error)]
#[error("Transport error: {0}")]
pub struct TransportError(pub String);

/// Bidirectional text channel to one client.
#[async_trait]
pub trait SessionTransport: Send {
    /// Next inbound text. `Ok(None)` means the client closed the channel.
    async fn recv_text(&mut self) -> Result<Option<String>, TransportError>;

    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Resolved,
    Streaming,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Resolved => "resolved",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What a finished session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub conversation_id: ConversationId,
    pub replayed: usize,
    pub turns: usize,
    /// Records made durable by the closing migration; `None` if it failed.
    pub migrated: Option<usize>,
}

/// Running sessions per conversation.
type LiveSessions = Arc<DashMap<ConversationId, usize>>;

/// Counts one running session for as long as it is alive.
struct LiveGuard {
    live: LiveSessions,
    conversation_id: ConversationId,
}

impl LiveGuard {
    fn enter(live: &LiveSessions, conversation_id: ConversationId) -> Self {
        *live.entry(conversation_id).or_insert(0) += 1;
        Self {
            live: live.clone(),
            conversation_id,
        }
    }

    /// Sessions on the same conversation besides this one.
    fn others(&self) -> usize {
        self.live
            .get(&self.conversation_id)
            .map(|count| count.saturating_sub(1))
            .unwrap_or(0)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        if let Some(mut count) = self.live.get_mut(&self.conversation_id) {
            *count = count.saturating_sub(1);
        }
        self.live.remove_if(&self.conversation_id, |_, count| *count == 0);
    }
}

#[derive(Clone)]
pub struct SessionController {
    conversations: ConversationService,
    engine: MigrationEngine,
    cache: Arc<dyn MessageCache>,
    relay: Arc<dyn CompletionProvider>,
    scheduler: Arc<MigrationScheduler>,
    live: LiveSessions,
}

impl SessionController {
    pub fn new(
        conversations: ConversationService,
        engine: MigrationEngine,
        cache: Arc<dyn MessageCache>,
        relay: Arc<dyn CompletionProvider>,
        scheduler: Arc<MigrationScheduler>,
    ) -> Self {
        Self {
            conversations,
            engine,
            cache,
            relay,
            scheduler,
            live: Arc::new(DashMap::new()),
        }
    }

    /// Number of sessions currently running on a conversation.
    pub fn live_sessions(&self, conversation_id: &ConversationId) -> usize {
        self.live.get(conversation_id).map(|count| *count).unwrap_or(0)
    }

    /// Binds a caller to a conversation. Without a requested id a new
    /// conversation with the default title is created; otherwise the caller
    /// must own the requested one. Nothing is written on failure.
    pub async fn resolve(
        &self,
        user_id: Option<UserId>,
        requested: Option<ConversationId>,
    ) -> Result<ResolvedSession, DomainError> {
        debug!("Session {}", SessionState::Connecting);
        let user_id = user_id.ok_or(DomainError::AuthRequired)?;

        let conversation = match requested {
            Some(id) => self.conversations.get_owned(&user_id, &id).await?,
            None => self.conversations.create(&user_id, None).await?,
        };

        info!(
            "Session {} for user {} on conversation {}",
            SessionState::Resolved,
            user_id,
            conversation.id
        );

        Ok(ResolvedSession {
            controller: self.clone(),
            user_id,
            conversation,
        })
    }
}

/// A session whose caller and conversation are settled.
pub struct ResolvedSession {
    controller: SessionController,
    user_id: UserId,
    conversation: Conversation,
}

impl ResolvedSession {
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Drives the session until the client goes away, then migrates the
    /// conversation's cache entry. Turn-level failures are reported to the
    /// client as `Error: ...` frames and never end the session.
    pub async fn run<T: SessionTransport>(self, transport: &mut T) -> SessionReport {
        let conversation_id = self.conversation.id;
        let live = LiveGuard::enter(&self.controller.live, conversation_id);
        let mut report = SessionReport {
            conversation_id,
            replayed: 0,
            turns: 0,
            migrated: None,
        };

        let history = match self.controller.engine.hydrate_or_fetch(&conversation_id).await {
            Ok(history) => history,
            Err(e) => {
                error!("Hydration of conversation {} failed: {}", conversation_id, e);
                let _ = transport.send_text(error_frame(&e)).await;
                debug!("Session {}", SessionState::Closed);
                return report;
            }
        };

        let mut connected = true;
        for message in &history {
            let frame = match serde_json::to_string(message) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Skipping unserializable message {}: {}", message.message_id, e);
                    continue;
                }
            };
            if let Err(e) = transport.send_text(frame).await {
                warn!("Replay to conversation {} aborted: {}", conversation_id, e);
                connected = false;
                break;
            }
            report.replayed += 1;
        }

        self.controller.scheduler.schedule(conversation_id);

        while connected {
            let question = match transport.recv_text().await {
                Ok(Some(text)) => text,
                Ok(None) => break,
                Err(e) => {
                    debug!("Read on conversation {} failed: {}", conversation_id, e);
                    break;
                }
            };

            debug!(
                "Session {} turn {} on conversation {}",
                SessionState::Streaming,
                report.turns + 1,
                conversation_id
            );
            connected = self.stream_turn(transport, question).await;
            report.turns += 1;
        }

        debug!("Session {} for conversation {}", SessionState::Closing, conversation_id);
        match self.controller.engine.migrate(&conversation_id).await {
            Ok(records) => {
                // Another live session still relies on the pending timer.
                if live.others() == 0 {
                    self.controller.scheduler.cancel(&conversation_id);
                } else {
                    debug!("Keeping migration timer of {} for other sessions", conversation_id);
                }
                report.migrated = Some(records);
            }
            Err(e) => {
                // The pending timer and the shutdown sweep retry it.
                error!("Closing migration of {} failed: {}", conversation_id, e);
            }
        }

        info!(
            "Session {} for conversation {} after {} turns",
            SessionState::Closed,
            conversation_id,
            report.turns
        );
        report
    }

    /// Relays one question, forwarding each fragment as it arrives, and
    /// appends the finished turn to the cache. Returns whether the
    /// transport is still usable.
    async fn stream_turn<T: SessionTransport>(&self, transport: &mut T, question: String) -> bool {
        let conversation_id = self.conversation.id;
        let mut connected = true;
        let mut answer = String::new();

        let mut fragments = self.controller.relay.stream(&conversation_id, &question);
        while let Some(fragment) = fragments.next().await {
            if let RelayFragment::Delta(text) = &fragment {
                answer.push_str(text);
            } else {
                warn!(
                    "Relay failed for conversation {}: {}",
                    conversation_id,
                    fragment.text()
                );
            }

            // A gone client does not stop the relay; the turn is still kept.
            if connected {
                if let Err(e) = transport.send_text(fragment.text().to_string()).await {
                    warn!("Forwarding to conversation {} stopped: {}", conversation_id, e);
                    connected = false;
                }
            }
        }

        let message = Message::new_turn(self.user_id.clone(), conversation_id, question, answer);
        if let Err(e) = self.controller.cache.append(&conversation_id, &message).await {
            error!(
                "Storing turn {} of conversation {} failed: {}",
                message.message_id, conversation_id, e
            );
            if connected && transport.send_text(error_frame(&e)).await.is_err() {
                connected = false;
            }
        }

        connected
    }
}

fn error_frame(error: &DomainError) -> String {
    format!("Error: {}", error)
}
