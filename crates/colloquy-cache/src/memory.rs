use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use colloquy_core::{ConversationId, Message};
use mini_moka::sync::Cache;

use crate::{CacheError, ConversationCache};

#[derive(Debug, Clone)]
struct CachedConversation {
    messages: Arc<Vec<Message>>,
    /// `None` when the TTL overflows `Instant`
    expires_at: Option<Instant>,
}

impl CachedConversation {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process conversation store
///
/// Every entry carries its own expiry; expired entries are dropped when
/// next read. Capacity is bounded, least-recently-used entries are evicted
/// first once it is reached.
#[derive(Clone)]
pub struct MemoryConversationCache {
    entries: Cache<ConversationId, CachedConversation>,
}

impl MemoryConversationCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    fn live_entry(&self, id: ConversationId) -> Option<CachedConversation> {
        let entry = self.entries.get(&id)?;

        if entry.is_expired(Instant::now()) {
            self.entries.invalidate(&id);
            tracing::trace!(conversation_id = %id, "conversation expired");
            return None;
        }

        Some(entry)
    }
}

impl Default for MemoryConversationCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl ConversationCache for MemoryConversationCache {
    async fn set(&self, id: ConversationId, messages: &[Message], ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            self.entries.invalidate(&id);
            return Ok(());
        }

        let entry = CachedConversation {
            messages: Arc::new(messages.to_vec()),
            expires_at: Instant::now().checked_add(ttl),
        };
        self.entries.insert(id, entry);

        Ok(())
    }

    async fn get(&self, id: ConversationId) -> Result<Option<Vec<Message>>, CacheError> {
        Ok(self.live_entry(id).map(|entry| entry.messages.as_ref().clone()))
    }

    async fn remove(&self, id: ConversationId) -> Result<(), CacheError> {
        self.entries.invalidate(&id);
        Ok(())
    }

    async fn exists(&self, id: ConversationId) -> Result<bool, CacheError> {
        Ok(self.live_entry(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn set_then_get() {
        let cache = MemoryConversationCache::default();
        let id = Uuid::new_v4();
        let messages = vec![Message::system("be brief"), Message::user("hi")];

        cache.set(id, &messages, HOUR).await.unwrap();

        assert_eq!(cache.get(id).await.unwrap(), Some(messages));
        assert!(cache.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn set_replaces_previous_list() {
        let cache = MemoryConversationCache::default();
        let id = Uuid::new_v4();

        cache.set(id, &[Message::user("one")], HOUR).await.unwrap();
        cache.set(id, &[Message::user("two")], HOUR).await.unwrap();

        assert_eq!(cache.get(id).await.unwrap(), Some(vec![Message::user("two")]));
    }

    #[tokio::test]
    async fn missing_entry() {
        let cache = MemoryConversationCache::default();
        let id = Uuid::new_v4();

        assert_eq!(cache.get(id).await.unwrap(), None);
        assert!(!cache.exists(id).await.unwrap());
        cache.remove(id).await.unwrap();
    }

    #[tokio::test]
    async fn remove_drops_entry() {
        let cache = MemoryConversationCache::default();
        let id = Uuid::new_v4();

        cache.set(id, &[Message::user("hi")], HOUR).await.unwrap();
        cache.remove(id).await.unwrap();

        assert_eq!(cache.get(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire_per_ttl() {
        let cache = MemoryConversationCache::default();
        let short = Uuid::new_v4();
        let long = Uuid::new_v4();

        cache.set(short, &[Message::user("a")], Duration::from_millis(20)).await.unwrap();
        cache.set(long, &[Message::user("b")], HOUR).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get(short).await.unwrap(), None);
        assert!(!cache.exists(short).await.unwrap());
        assert!(cache.exists(long).await.unwrap());
    }

    #[tokio::test]
    async fn rewrite_restarts_expiration() {
        let cache = MemoryConversationCache::default();
        let id = Uuid::new_v4();
        let ttl = Duration::from_millis(80);

        cache.set(id, &[Message::user("a")], ttl).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.set(id, &[Message::user("b")], ttl).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(cache.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn zero_ttl_removes() {
        let cache = MemoryConversationCache::default();
        let id = Uuid::new_v4();

        cache.set(id, &[Message::user("a")], HOUR).await.unwrap();
        cache.set(id, &[Message::user("b")], Duration::ZERO).await.unwrap();

        assert!(!cache.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let cache = MemoryConversationCache::default();
        let other = cache.clone();
        let id = Uuid::new_v4();

        cache.set(id, &[Message::user("shared")], HOUR).await.unwrap();

        assert!(other.exists(id).await.unwrap());
    }
}
