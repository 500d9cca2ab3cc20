//! Conversation model shared by the Colloquy crates
//!
//! Holds the provider-agnostic message records that the cache stores and
//! the client sends, plus conversation identifier helpers.

#![allow(clippy::must_use_candidate)]

pub mod conversation;
pub mod message;

pub use conversation::{ConversationId, resolve_conversation_id};
pub use message::{FunctionCall, Message, Role, ToolCall};
