//! # Chat API
//! 
//! HTTP and WebSocket surface: live chat sessions, conversation and
//! message management, health checks, and the identity extractors.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod state;

#[cfg(test)]
mod test_support;

pub use routes::create_router;
pub use state::AppState;
