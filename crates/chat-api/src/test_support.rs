//! Router wired to in-memory stores for handler tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use chat_core::error::DomainError;
use chat_core::providers::ReadinessProbe;
use chat_core::services::{
    ConversationService, MessageService, MigrationEngine, MigrationScheduler, SessionController,
};
use chat_core::testing::{
    InMemoryConversationRepository, InMemoryMessageCache, InMemoryMessageRepository, ScriptedRelay,
};
use chat_security::JwtService;

use crate::routes::create_router;
use crate::state::AppState;

pub struct StaticProbe {
    pub name: &'static str,
    pub healthy: bool,
}

#[async_trait]
impl ReadinessProbe for StaticProbe {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn ping(&self) -> Result<(), DomainError> {
        if self.healthy {
            Ok(())
        } else {
            Err(DomainError::StoreUnavailable("connection refused".to_string()))
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub conversations: Arc<InMemoryConversationRepository>,
    pub durable: Arc<InMemoryMessageRepository>,
    pub cache: Arc<InMemoryMessageCache>,
    jwt: JwtService,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_probes(Vec::new())
    }

    pub fn with_probes(probes: Vec<Arc<dyn ReadinessProbe>>) -> Self {
        let durable = Arc::new(InMemoryMessageRepository::new());
        let conversations = Arc::new(InMemoryConversationRepository::with_messages(durable.clone()));
        let cache = Arc::new(InMemoryMessageCache::new());
        let engine = MigrationEngine::new(durable.clone(), cache.clone());
        let scheduler = Arc::new(MigrationScheduler::new(
            engine.clone(),
            Duration::from_secs(1800),
        ));
        let conversation_service = ConversationService::new(
            conversations.clone(),
            cache.clone(),
            scheduler.clone(),
            "New Conversation".to_string(),
        );
        let sessions = SessionController::new(
            conversation_service.clone(),
            engine,
            cache.clone(),
            Arc::new(ScriptedRelay::deltas(&["ok"])),
            scheduler,
        );
        let jwt = JwtService::new("test-secret".to_string(), 600);

        let state = AppState {
            sessions,
            conversations: conversation_service,
            messages: MessageService::new(durable.clone(), cache.clone()),
            jwt: jwt.clone(),
            probes: Arc::new(probes),
        };

        Self {
            router: create_router(state),
            conversations,
            durable,
            cache,
            jwt,
        }
    }

    pub fn token_for(&self, user_id: &str) -> String {
        self.jwt.generate_access_token(user_id).unwrap()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// Serves the router on an ephemeral port and returns its base URL.
    pub async fn serve(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}
