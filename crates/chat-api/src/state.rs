use std::sync::Arc;

use chat_core::providers::ReadinessProbe;
use chat_core::services::{ConversationService, MessageService, SessionController};
use chat_security::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionController,
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub jwt: JwtService,
    /// Backing stores checked by the readiness endpoint.
    pub probes: Arc<Vec<Arc<dyn ReadinessProbe>>>,
}
