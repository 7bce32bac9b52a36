//! # Chat Core - Domain Module
//! 
//! Domain entities for the chat backend.

pub mod conversation;
pub mod message;

pub use conversation::{Conversation, ConversationId, NewConversation};
pub use message::{Message, MessageId, ThumbRating};
