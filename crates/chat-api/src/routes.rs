//! Route table

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::{conversations, health, messages, session};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        // Live chat session
        .route("/api/v1/messages/ws", get(session::open_session))
        // Message feedback
        .route("/api/v1/messages/{id}", put(messages::update_message))
        // Conversation management
        .route("/api/v1/conversations", post(conversations::create_conversation))
        .route(
            "/api/v1/conversations/{id}",
            get(conversations::get_conversation)
                .patch(conversations::rename_conversation)
                .delete(conversations::delete_conversation),
        )
        .with_state(state)
}
