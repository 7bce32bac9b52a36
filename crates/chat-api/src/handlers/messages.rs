//! Message feedback handler

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use chat_core::domain::{Message, ThumbRating};

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    pub feedback: String,
    /// -1 (down), 0 (unset) or 1 (up).
    #[serde(rename = "thumbup")]
    pub thumb_up: i16,
}

/// Feedback handler - PUT /api/v1/messages/{id}
pub async fn update_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMessageRequest>,
) -> Result<Json<ApiResponse<Message>>, ApiError> {
    let thumb = ThumbRating::try_from(payload.thumb_up).map_err(ApiError::BadRequest)?;

    let message = state
        .messages
        .update_feedback(&user_id, &id, &payload.feedback, thumb)
        .await?;

    Ok(Json(ApiResponse::success_with_message(message, "Message updated")))
}
