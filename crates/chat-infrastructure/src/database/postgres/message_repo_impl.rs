// ============================================================================
// Chat Infrastructure - PostgreSQL Message Repository
// File: crates/chat-infrastructure/src/database/postgres/message_repo_impl.rs
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{error, warn};
use uuid::Uuid;

use chat_core::domain::{ConversationId, Message, MessageId, ThumbRating};
use chat_core::error::DomainError;
use chat_core::repositories::MessageRepository;

pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal row type for SQLx mapping
#[derive(Debug, FromRow)]
struct MessageRow {
    pub message_id: Uuid,
    pub user_id: String,
    pub conversation_id: Uuid,
    pub question: String,
    pub answer: String,
    pub feedback: Option<String>,
    pub thumb_up: i16,
    pub input_url: Option<String>,
    pub output_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        let thumb = ThumbRating::try_from(row.thumb_up).unwrap_or_else(|e| {
            warn!("Message {}: {}", row.message_id, e);
            ThumbRating::Unset
        });

        Message {
            message_id: row.message_id,
            user_id: row.user_id,
            conversation_id: row.conversation_id,
            question: row.question,
            answer: row.answer,
            feedback: row.feedback,
            thumb,
            input_url: row.input_url,
            output_url: row.output_url,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn find_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, DomainError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT
                message_id, user_id, conversation_id, question, answer,
                feedback, thumb_up, input_url, output_url, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY seq
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e: sqlx::Error| {
            error!("Database error listing messages of {}: {}", conversation_id, e);
            DomainError::StoreUnavailable(e.to_string())
        })?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn find_by_id(&self, message_id: &MessageId) -> Result<Option<Message>, DomainError> {
        let row: Option<MessageRow> = sqlx::query_as(
            r#"
            SELECT
                message_id, user_id, conversation_id, question, answer,
                feedback, thumb_up, input_url, output_url, created_at
            FROM messages
            WHERE message_id = $1
            "#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e: sqlx::Error| {
            error!("Database error finding message by id: {}", e);
            DomainError::StoreUnavailable(e.to_string())
        })?;

        Ok(row.map(|r| r.into()))
    }

    async fn upsert(&self, message: &Message) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                message_id, user_id, conversation_id, question, answer,
                feedback, thumb_up, input_url, output_url, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (message_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                conversation_id = EXCLUDED.conversation_id,
                question = EXCLUDED.question,
                answer = EXCLUDED.answer,
                feedback = EXCLUDED.feedback,
                thumb_up = EXCLUDED.thumb_up,
                input_url = EXCLUDED.input_url,
                output_url = EXCLUDED.output_url,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(message.message_id)
        .bind(&message.user_id)
        .bind(message.conversation_id)
        .bind(&message.question)
        .bind(&message.answer)
        .bind(&message.feedback)
        .bind(message.thumb.as_i16())
        .bind(&message.input_url)
        .bind(&message.output_url)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e: sqlx::Error| {
            error!("Database error upserting message {}: {}", message.message_id, e);
            DomainError::StoreUnavailable(e.to_string())
        })?;

        Ok(())
    }

    async fn update_feedback(
        &self,
        message_id: &MessageId,
        feedback: &str,
        thumb: ThumbRating,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE messages SET feedback = $2, thumb_up = $3 WHERE message_id = $1",
        )
        .bind(message_id)
        .bind(feedback)
        .bind(thumb.as_i16())
        .execute(&self.pool)
        .await
        .map_err(|e: sqlx::Error| {
            error!("Database error updating feedback of {}: {}", message_id, e);
            DomainError::StoreUnavailable(e.to_string())
        })?;

        Ok(result.rows_affected() > 0)
    }
}
