//! In-memory response cache.
//!
//! Maps a request's path+query to the body the origin returned for it. There
//! is no expiry, eviction or size bound: entries live until [`CacheStore::clear`].

use bytes::Bytes;
use dashmap::DashMap;

/// Concurrent path+query → body store shared by every request handler.
///
/// Backed by a lock-striped [`DashMap`], so callers never lock anything
/// themselves. Bodies are stored as [`Bytes`], making a hit a refcount bump
/// rather than a copy.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use caching_proxy::cache::CacheStore;
///
/// let cache = CacheStore::new();
/// cache.insert("/foo?x=1", Bytes::from_static(b"hello"));
/// assert_eq!(cache.lookup("/foo?x=1").as_deref(), Some(&b"hello"[..]));
/// assert_eq!(cache.lookup("/foo?x=2"), None);
///
/// assert_eq!(cache.clear(), 1);
/// assert!(cache.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: DashMap<String, Bytes>,
}

impl CacheStore {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached body for `key`, if any.
    pub fn lookup(&self, key: &str) -> Option<Bytes> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Stores `body` under `key`, replacing any previous entry.
    pub fn insert(&self, key: impl Into<String>, body: Bytes) {
        self.entries.insert(key.into(), body);
    }

    /// Drops every entry and returns how many were removed.
    pub fn clear(&self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn keys_are_verbatim() {
        let cache = CacheStore::new();
        cache.insert("/a?x=1&y=2", Bytes::from_static(b"one"));
        assert!(cache.lookup("/a?y=2&x=1").is_none());
        assert!(cache.lookup("/A?x=1&y=2").is_none());
        assert!(cache.lookup("/a/?x=1&y=2").is_none());
        assert!(cache.lookup("/a?x=1&y=2").is_some());
    }

    #[test]
    fn later_insert_wins() {
        let cache = CacheStore::new();
        cache.insert("/k", Bytes::from_static(b"first"));
        cache.insert("/k", Bytes::from_static(b"second"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("/k").unwrap(), Bytes::from_static(b"second"));
    }

    #[test]
    fn clear_on_empty_is_noop() {
        let cache = CacheStore::new();
        assert_eq!(cache.clear(), 0);
        assert_eq!(cache.clear(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_and_lookups() {
        let cache = Arc::new(CacheStore::new());
        let mut tasks = Vec::new();
        for i in 0..32 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                let key = format!("/item?id={i}");
                cache.insert(key.clone(), Bytes::from(i.to_string()));
                cache.lookup(&key)
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_some());
        }
        assert_eq!(cache.len(), 32);
    }
}
