// ============================================================================
// Chat API - Live Session Handler
// File: crates/chat-api/src/handlers/session.rs
// ============================================================================
//! `GET /api/v1/messages/ws?conversationID=<uuid>`
//!
//! Identity and ownership are settled before the upgrade, so a refused
//! caller gets a plain 400/401/403/404 instead of an opened socket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use chat_core::services::{SessionTransport, TransportError};

use crate::error::ApiError;
use crate::middleware::MaybeAuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionParams {
    #[serde(rename = "conversationID")]
    pub conversation_id: Option<String>,
}

/// Text-frame transport over an upgraded socket.
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl SessionTransport for WsTransport {
    async fn recv_text(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(Message::Binary(_))) => debug!("Ignoring binary frame"),
                // Ping/pong are answered by the socket itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(TransportError(e.to_string())),
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError(e.to_string()))
    }
}

fn parse_conversation_id(raw: Option<&str>) -> Result<Option<Uuid>, ApiError> {
    match raw.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => Uuid::parse_str(id)
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Invalid conversationID: {}", id))),
        None => Ok(None),
    }
}

/// Session handler - GET /api/v1/messages/ws
pub async fn open_session(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    Query(params): Query<SessionParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let requested = parse_conversation_id(params.conversation_id.as_deref())?;
    let session = state.sessions.resolve(user, requested).await?;

    Ok(ws.on_upgrade(move |socket| async move {
        let mut transport = WsTransport::new(socket);
        let report = session.run(&mut transport).await;
        info!(
            conversation_id = %report.conversation_id,
            replayed = report.replayed,
            turns = report.turns,
            migrated = ?report.migrated,
            "Chat session finished"
        );
    }))
}
