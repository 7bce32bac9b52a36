//! Completion provider adapters

pub mod completion_client;

pub use completion_client::CompletionClient;
