use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use chat_api::{create_router, AppState};
use chat_core::providers::ReadinessProbe;
use chat_core::repositories::{MessageCache, MessageRepository};
use chat_core::services::{
    ConversationService, MessageService, MigrationEngine, MigrationScheduler, SessionController,
    ShutdownCoordinator, ShutdownOutcome,
};
use chat_infrastructure::{
    create_pool, create_redis_pool, CompletionClient, PgConversationRepository,
    PgMessageRepository, PgProbe, RedisMessageCache, RedisProbe,
};
use chat_security::JwtService;
use chat_shared::config::AppConfig;
use chat_shared::constants::MIGRATION_DELAY;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Initialize telemetry
    chat_shared::telemetry::init_telemetry();

    info!("Chat Server starting...");

    // Load configuration
    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Connect to stores
    info!("Connecting to database...");
    let pool = create_pool(&config.database).await?;
    info!("Database connection established.");

    let redis = create_redis_pool(&config.redis)?;

    // Adapters
    let durable: Arc<dyn MessageRepository> = Arc::new(PgMessageRepository::new(pool.clone()));
    let cache: Arc<dyn MessageCache> = Arc::new(RedisMessageCache::new(redis.clone()));
    let relay = Arc::new(CompletionClient::new(&config.llm)?);

    // Services
    let engine = MigrationEngine::new(durable.clone(), cache.clone());
    let scheduler = Arc::new(MigrationScheduler::new(engine.clone(), MIGRATION_DELAY));
    let conversations = ConversationService::new(
        Arc::new(PgConversationRepository::new(pool.clone())),
        cache.clone(),
        scheduler.clone(),
        config.session.default_title.clone(),
    );
    let sessions = SessionController::new(
        conversations.clone(),
        engine.clone(),
        cache.clone(),
        relay,
        scheduler.clone(),
    );
    let coordinator = ShutdownCoordinator::new(
        engine,
        scheduler,
        Duration::from_secs(config.session.shutdown_timeout_seconds),
    );

    let probes: Vec<Arc<dyn ReadinessProbe>> = vec![
        Arc::new(PgProbe::new(pool.clone())),
        Arc::new(RedisProbe::new(redis)),
    ];

    // Create App State
    let state = AppState {
        sessions,
        conversations,
        messages: MessageService::new(durable, cache),
        jwt: JwtService::new(config.jwt.secret.clone(), config.jwt.access_token_expiry),
        probes: Arc::new(probes),
    };

    let origin: HeaderValue = config.app.cors_origin.parse()?;
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
                .allow_credentials(true)
                .max_age(Duration::from_secs(12 * 3600)),
        );

    // Bind address
    let host: std::net::IpAddr = config.app.host.parse()?;
    let addr = SocketAddr::from((host, config.app.port));
    info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush the cache into the durable store before exiting
    match coordinator.drain().await {
        ShutdownOutcome::Completed(summary) if summary.is_clean() => {
            info!(
                "Shutdown migration done: {} conversations, {} records",
                summary.migrated, summary.records
            );
        }
        ShutdownOutcome::Completed(summary) => {
            warn!(
                "Shutdown migration partial: {} migrated, {} failed",
                summary.migrated,
                summary.failed.len()
            );
        }
        ShutdownOutcome::TimedOut => {
            warn!("Shutdown migration timed out; remaining conversations stay cached");
        }
    }

    pool.close().await;
    info!("Chat Server stopped");
    Ok(())
}
