//! Database module (PostgreSQL adapters)

pub mod connection;
pub mod postgres;

pub use connection::{create_pool, PgProbe};
pub use postgres::{PgConversationRepository, PgMessageRepository};
