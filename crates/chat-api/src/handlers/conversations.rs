// ============================================================================
// Chat API - Conversation Handlers
// File: crates/chat-api/src/handlers/conversations.rs
// ============================================================================
//! Conversation management (create, fetch, rename, delete)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use chat_core::domain::Conversation;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameConversationRequest {
    pub title: String,
}

/// Create handler - POST /api/v1/conversations
pub async fn create_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Option<Json<CreateConversationRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<Conversation>>), ApiError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let conversation = state
        .conversations
        .create(&user_id, payload.title.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(conversation))))
}

/// Fetch handler - GET /api/v1/conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Conversation>>, ApiError> {
    let conversation = state.conversations.get_owned(&user_id, &id).await?;
    Ok(Json(ApiResponse::success(conversation)))
}

/// Rename handler - PATCH /api/v1/conversations/{id}
pub async fn rename_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RenameConversationRequest>,
) -> Result<Json<ApiResponse<Conversation>>, ApiError> {
    let conversation = state
        .conversations
        .rename(&user_id, &id, &payload.title)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        conversation,
        "Conversation updated",
    )))
}

/// Delete handler - DELETE /api/v1/conversations/{id}
pub async fn delete_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Uuid>>, ApiError> {
    state.conversations.delete(&user_id, &id).await?;
    Ok(Json(ApiResponse::success_with_message(id, "Conversation deleted")))
}
