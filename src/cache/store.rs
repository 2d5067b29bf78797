//! Frozen post storage: a bounded LRU with a time-to-live.
//!
//! Posts are frozen behind `Arc` at admission; "updates" replace the
//! entry wholesale. Readers receive the shared snapshot and deep-copy on
//! the way out of the controller, so nothing outside ever mutates cache
//! state.

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;

use crate::models::Post;

/// Capacity bounds applied wherever a size is accepted.
pub const MIN_CACHE_SIZE: usize = 1_000;
pub const MAX_CACHE_SIZE: usize = 1_000_000;
/// Default capacity when none is configured.
pub const DEFAULT_CACHE_SIZE: usize = 100_000;
/// Entries older than this are treated as absent.
pub const DEFAULT_TTL_DAYS: i64 = 30;

/// Cache usage summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub enabled: bool,
}

struct FrozenEntry {
    post: Arc<Post>,
    admitted_at: DateTime<Utc>,
}

pub struct PostStore {
    entries: LruCache<String, FrozenEntry>,
    ttl: Duration,
}

fn capacity(max_size: usize) -> NonZeroUsize {
    let clamped = max_size.clamp(MIN_CACHE_SIZE, MAX_CACHE_SIZE);
    NonZeroUsize::new(clamped).unwrap_or(NonZeroUsize::MIN)
}

impl PostStore {
    pub fn new(max_size: usize, ttl_days: i64) -> Self {
        Self {
            entries: LruCache::new(capacity(max_size)),
            ttl: Duration::days(ttl_days),
        }
    }

    /// Freeze and admit a post, replacing any existing entry.
    pub fn insert(&mut self, post: Post) -> Arc<Post> {
        let frozen = Arc::new(post);
        self.entries.put(
            frozen.id.clone(),
            FrozenEntry {
                post: Arc::clone(&frozen),
                admitted_at: Utc::now(),
            },
        );
        frozen
    }

    /// Fetch a frozen post, promoting it. Expired entries are evicted on
    /// the spot and read as absent.
    pub fn get(&mut self, id: &str) -> Option<Arc<Post>> {
        let expired = self
            .entries
            .get(id)
            .is_some_and(|entry| Utc::now() - entry.admitted_at > self.ttl);
        if expired {
            self.entries.pop(id);
            return None;
        }
        self.entries.get(id).map(|entry| Arc::clone(&entry.post))
    }

    /// Presence check without promotion.
    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .peek(id)
            .is_some_and(|entry| Utc::now() - entry.admitted_at <= self.ttl)
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<Post>> {
        self.entries.pop(id).map(|entry| entry.post)
    }

    /// Every live post, most-recently-used first, without promotion.
    pub fn snapshot(&self) -> Vec<Arc<Post>> {
        let now = Utc::now();
        self.entries
            .iter()
            .filter(|(_, entry)| now - entry.admitted_at <= self.ttl)
            .map(|(_, entry)| Arc::clone(&entry.post))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replace the store with one of the new capacity, migrating entries
    /// oldest-first so the LRU evicts the stale end when shrinking.
    pub fn resize(&mut self, max_size: usize) {
        let mut replacement: LruCache<String, FrozenEntry> = LruCache::new(capacity(max_size));

        let mut entries: Vec<(String, FrozenEntry)> = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.entries.pop_lru() {
            entries.push(entry);
        }
        // pop_lru drains oldest-first, which is already insertion order
        // for the replacement.
        for (id, entry) in entries {
            replacement.put(id, entry);
        }

        self.entries = replacement;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::workspace_post;

    #[test]
    fn test_insert_get_remove() {
        let mut store = PostStore::new(MIN_CACHE_SIZE, DEFAULT_TTL_DAYS);
        store.insert(workspace_post("abc123def456", "hello"));

        let post = store.get("#commit:abc123def456").unwrap();
        assert_eq!(post.content, "hello");

        store.remove("#commit:abc123def456");
        assert!(store.get("#commit:abc123def456").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_clamped() {
        let store = PostStore::new(1, DEFAULT_TTL_DAYS);
        assert_eq!(store.max_size(), MIN_CACHE_SIZE);

        let store = PostStore::new(usize::MAX, DEFAULT_TTL_DAYS);
        assert_eq!(store.max_size(), MAX_CACHE_SIZE);
    }

    #[test]
    fn test_expired_entries_read_as_absent() {
        // Negative TTL: everything is expired immediately.
        let mut store = PostStore::new(MIN_CACHE_SIZE, -1);
        store.insert(workspace_post("abc123def456", "hello"));

        assert!(store.get("#commit:abc123def456").is_none());
        assert!(!store.contains("#commit:abc123def456"));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_resize_preserves_entries() {
        let mut store = PostStore::new(MIN_CACHE_SIZE, DEFAULT_TTL_DAYS);
        store.insert(workspace_post("aaa111bbb222", "one"));
        store.insert(workspace_post("ccc333ddd444", "two"));

        store.resize(MIN_CACHE_SIZE * 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.max_size(), MIN_CACHE_SIZE * 2);
        assert!(store.get("#commit:aaa111bbb222").is_some());
        assert!(store.get("#commit:ccc333ddd444").is_some());
    }

    #[test]
    fn test_insert_replaces_entry() {
        let mut store = PostStore::new(MIN_CACHE_SIZE, DEFAULT_TTL_DAYS);
        store.insert(workspace_post("abc123def456", "old"));
        store.insert(workspace_post("abc123def456", "new"));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("#commit:abc123def456").unwrap().content, "new");
    }
}
