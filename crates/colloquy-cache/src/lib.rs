//! Conversation stores
//!
//! A conversation is the ordered message list for one id. Stores replace
//! the whole list on every write and expire it after a period without
//! writes. Concurrent writes to the same id are last-write-wins.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod memory;
#[cfg(feature = "redis")]
mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;
use colloquy_core::{ConversationId, Message};
use thiserror::Error;

pub use memory::MemoryConversationCache;
#[cfg(feature = "redis")]
pub use redis_cache::RedisConversationCache;

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Store connection or command error
    #[error("cache backend: {0}")]
    Backend(String),
    /// Stored value could not be encoded or decoded
    #[error("serialization: {0}")]
    Serialization(String),
}

/// Storage for conversation histories
///
/// Implementations must be safe to share between tasks. A zero `ttl`
/// removes the entry.
#[async_trait]
pub trait ConversationCache: Send + Sync {
    /// Replace the stored messages and restart the expiration clock
    async fn set(&self, id: ConversationId, messages: &[Message], ttl: Duration) -> Result<(), CacheError>;

    /// Stored messages, `None` when absent or expired
    async fn get(&self, id: ConversationId) -> Result<Option<Vec<Message>>, CacheError>;

    /// Drop the entry, no-op when absent
    async fn remove(&self, id: ConversationId) -> Result<(), CacheError>;

    async fn exists(&self, id: ConversationId) -> Result<bool, CacheError> {
        Ok(self.get(id).await?.is_some())
    }
}
