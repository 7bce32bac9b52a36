//! Domain services (business logic)

pub mod conversation_service;
pub mod message_service;
pub mod migration_scheduler;
pub mod migration_service;
pub mod session_service;
pub mod shutdown_service;

pub use conversation_service::ConversationService;
pub use message_service::MessageService;
pub use migration_scheduler::MigrationScheduler;
pub use migration_service::{MigrationEngine, MigrationSummary};
pub use session_service::{
    ResolvedSession, SessionController, SessionReport, SessionState, SessionTransport,
    TransportError,
};
pub use shutdown_service::{ShutdownCoordinator, ShutdownOutcome};
