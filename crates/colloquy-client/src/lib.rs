#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! Conversation-aware client for `OpenAI` and Azure `OpenAI` chat completions
//!
//! [`ChatClient`] keeps a bounded history per conversation id, builds the
//! request from it, and parses plain or streamed responses. Function and
//! tool calls are stored in the history so their results can be fed back
//! with [`ChatClient::add_function_response`] or
//! [`ChatClient::add_tool_response`] before asking again.

mod builder;
mod client;
mod conversation;
pub mod error;
pub mod history;
mod options;
mod stream;
pub mod types;

pub use client::ChatClient;
pub use colloquy_cache::{CacheError, ConversationCache, MemoryConversationCache};
#[cfg(feature = "redis")]
pub use colloquy_cache::RedisConversationCache;
pub use colloquy_config as config;
pub use colloquy_config::{ChatParameters, ClientConfig, EmbeddingParameters, ResponseFormat};
pub use colloquy_core::{ConversationId, FunctionCall, Message, Role, ToolCall};
pub use error::{ChatError, Result};
pub use options::{AskOptions, EmbeddingOptions};
pub use stream::ChatStream;
pub use tokio_util::sync::CancellationToken;
pub use types::*;
