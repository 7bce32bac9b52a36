// ============================================================================
// Chat Core - Message Entity
// File: crates/chat-core/src/domain/message.rs
// Description: One turn (question + answer) of a conversation
// ============================================================================

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chat_shared::UserId;

use super::conversation::ConversationId;

pub type MessageId = Uuid;

/// Thumb rating, stored and serialized as -1 / 0 / 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum ThumbRating {
    Down,
    #[default]
    Unset,
    Up,
}

impl ThumbRating {
    pub fn as_i16(self) -> i16 {
        match self {
            Self::Down => -1,
            Self::Unset => 0,
            Self::Up => 1,
        }
    }
}

impl From<ThumbRating> for i16 {
    fn from(rating: ThumbRating) -> Self {
        rating.as_i16()
    }
}

impl TryFrom<i16> for ThumbRating {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Down),
            0 => Ok(Self::Unset),
            1 => Ok(Self::Up),
            other => Err(format!("invalid thumb rating: {}", other)),
        }
    }
}

/// Message entity. `message_id` is generated by the producer and is the
/// idempotency key when the cache is migrated into the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(rename = "thumbup", default)]
    pub thumb: ThumbRating,
    #[serde(default)]
    pub input_url: Option<String>,
    #[serde(default)]
    pub output_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A freshly produced turn with default feedback, rating and attachments.
    pub fn new_turn(
        user_id: UserId,
        conversation_id: ConversationId,
        question: String,
        answer: String,
    ) -> Self {
        Self {
            message_id: chat_shared::new_id(),
            user_id,
            conversation_id,
            question,
            answer,
            feedback: None,
            thumb: ThumbRating::Unset,
            input_url: None,
            output_url: None,
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    pub fn with_feedback(mut self, feedback: String, thumb: ThumbRating) -> Self {
        self.feedback = Some(feedback);
        self.thumb = thumb;
        self
    }
}
