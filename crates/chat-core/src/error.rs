//! Domain errors

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Authentication required")]
    AuthRequired,

    #[error("Resource {0} belongs to another user")]
    OwnershipMismatch(Uuid),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(Uuid),

    #[error("Message not found: {0}")]
    MessageNotFound(Uuid),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Migration of conversation {conversation_id} failed: {reason}")]
    MigrationFailed { conversation_id: Uuid, reason: String },

    #[error("Completion relay failed: {0}")]
    RelayFailed(String),

    #[error("Malformed completion chunk: {0}")]
    MalformedChunk(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        DomainError::ValidationError(errors.to_string())
    }
}
