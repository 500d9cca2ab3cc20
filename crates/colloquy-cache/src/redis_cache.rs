use std::time::Duration;

use async_trait::async_trait;
use colloquy_core::{ConversationId, Message};
use redis::AsyncCommands;

use crate::{CacheError, ConversationCache};

/// Conversation store backed by Redis or Valkey
///
/// Each conversation is a JSON array under `{prefix}:{id}` written with
/// `SET EX`, so expiry is enforced by the server.
#[derive(Clone)]
pub struct RedisConversationCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisConversationCache {
    /// Create a store for the given connection URL
    ///
    /// No connection is made until the first command.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid
    pub fn new(url: &str, key_prefix: impl Into<String>) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Backend(format!("invalid URL: {e}")))?;

        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, id: ConversationId) -> String {
        format!("{}:{id}", self.key_prefix)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(format!("connection failed: {e}")))
    }
}

#[async_trait]
impl ConversationCache for RedisConversationCache {
    async fn set(&self, id: ConversationId, messages: &[Message], ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return self.remove(id).await;
        }

        let data = serde_json::to_string(messages).map_err(|e| CacheError::Serialization(format!("serialize: {e}")))?;
        // Sub-second TTLs round up, SET EX rejects zero
        let ttl_secs = ttl.as_secs().max(1);

        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(self.key(id), data, ttl_secs)
            .await
            .map_err(|e| CacheError::Backend(format!("SET failed: {e}")))?;

        tracing::debug!(conversation_id = %id, messages = messages.len(), ttl_secs, "stored conversation");
        Ok(())
    }

    async fn get(&self, id: ConversationId) -> Result<Option<Vec<Message>>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(self.key(id))
            .await
            .map_err(|e| CacheError::Backend(format!("GET failed: {e}")))?;

        raw.map(|data| {
            serde_json::from_str(&data).map_err(|e| CacheError::Serialization(format!("deserialize: {e}")))
        })
        .transpose()
    }

    async fn remove(&self, id: ConversationId) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(self.key(id))
            .await
            .map_err(|e| CacheError::Backend(format!("DEL failed: {e}")))?;

        Ok(())
    }

    async fn exists(&self, id: ConversationId) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        conn.exists(self.key(id))
            .await
            .map_err(|e| CacheError::Backend(format!("EXISTS failed: {e}")))
    }
}
