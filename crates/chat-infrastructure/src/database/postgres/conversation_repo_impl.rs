// ============================================================================
// Chat Infrastructure - PostgreSQL Conversation Repository
// File: crates/chat-infrastructure/src/database/postgres/conversation_repo_impl.rs
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{error, info};
use uuid::Uuid;

use chat_core::domain::{Conversation, ConversationId, NewConversation};
use chat_core::error::DomainError;
use chat_core::repositories::ConversationRepository;

pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal row type for SQLx mapping
#[derive(Debug, FromRow)]
struct ConversationRow {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn create(&self, conversation: &NewConversation) -> Result<Conversation, DomainError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO conversations (user_id, title, created_at)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(conversation.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e: sqlx::Error| {
            error!("Database error creating conversation: {}", e);
            DomainError::StoreUnavailable(e.to_string())
        })?;

        Ok(conversation.clone().into_conversation(id))
    }

    async fn find_by_id(&self, id: &ConversationId) -> Result<Option<Conversation>, DomainError> {
        let row: Option<ConversationRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, title, created_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e: sqlx::Error| {
            error!("Database error finding conversation by id: {}", e);
            DomainError::StoreUnavailable(e.to_string())
        })?;

        Ok(row.map(|r| r.into()))
    }

    async fn update_title(&self, id: &ConversationId, title: &str) -> Result<bool, DomainError> {
        let result = sqlx::query("UPDATE conversations SET title = $2 WHERE id = $1")
            .bind(id)
            .bind(title)
            .execute(&self.pool)
            .await
            .map_err(|e: sqlx::Error| {
                error!("Database error updating conversation title: {}", e);
                DomainError::StoreUnavailable(e.to_string())
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, DomainError> {
        let db_error = |e: sqlx::Error| {
            error!("Database error deleting conversation {}: {}", id, e);
            DomainError::StoreUnavailable(e.to_string())
        };

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let messages = sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let conversation = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        info!(
            "Deleted conversation {} with {} messages",
            id,
            messages.rows_affected()
        );
        Ok(conversation.rows_affected() > 0)
    }
}
