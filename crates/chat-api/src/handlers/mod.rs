//! HTTP and WebSocket handlers

pub mod conversations;
pub mod health;
pub mod messages;
pub mod session;
