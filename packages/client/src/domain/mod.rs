//! Domain model of the synchronization engine.
//!
//! - `value_object`: identifiers
//! - `entity`: conversations and messages
//! - `reconcile`: ordering and de-duplication rules
//! - `typing`: typing presence sets

pub mod entity;
pub mod reconcile;
pub mod typing;
pub mod value_object;

pub use entity::{Conversation, LastMessage, Message, MessageContent, MessageType, UserSummary};
pub use typing::TypingState;
pub use value_object::{ConversationId, MessageId, UserId, ValueObjectError};
