use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::CacheResult;
use crate::traits::{Cache, Lookup};

struct Entry {
    value: Bytes,
    tick: u64,
}

#[derive(Default)]
struct LruState {
    entries: HashMap<String, Entry>,
    /// Recency order: lowest tick is least recently used.
    order: BTreeMap<u64, String>,
    next_tick: u64,
    size: usize,
}

impl LruState {
    fn touch(&mut self, key: &str) -> Option<Bytes> {
        let tick = self.next_tick;
        let entry = self.entries.get_mut(key)?;
        self.next_tick += 1;
        let previous = std::mem::replace(&mut entry.tick, tick);
        let value = entry.value.clone();
        if let Some(key) = self.order.remove(&previous) {
            self.order.insert(tick, key);
        }
        Some(value)
    }

    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.order.remove(&entry.tick);
            self.size -= entry_size(key, &entry.value);
        }
    }

    fn evict_to(&mut self, budget: usize) -> usize {
        let mut evicted = 0;
        while self.size > budget {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.size -= entry_size(&key, &entry.value);
                evicted += 1;
            }
        }
        evicted
    }
}

fn entry_size(key: &str, value: &Bytes) -> usize {
    key.len() + value.len()
}

/// In-memory LRU cache bounded by total key and value bytes.
///
/// Reads refresh recency. A write that pushes the total over the budget
/// evicts least recently used entries until it fits again; a single entry
/// larger than the whole budget is not stored at all.
pub struct InMemoryCache {
    max_size: usize,
    state: Mutex<LruState>,
}

impl InMemoryCache {
    /// Create a cache holding at most `max_size` bytes of keys and values.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            state: Mutex::new(LruState::default()),
        }
    }

    /// A cache that never evicts.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    fn lock(&self) -> MutexGuard<'_, LruState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Bytes currently held.
    pub fn size(&self) -> usize {
        self.lock().size
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Returns `true` if `key` is present, without refreshing its recency.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn clear(&self) {
        *self.lock() = LruState::default();
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryCache")
            .field("entries", &state.entries.len())
            .field("size", &state.size)
            .field("max_size", &self.max_size)
            .finish()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn lookup(&self, key: &str) -> CacheResult<Lookup> {
        Ok(self.lock().touch(key).into())
    }

    async fn write(&self, key: &str, value: Bytes) -> CacheResult<()> {
        let size = entry_size(key, &value);
        if size > self.max_size {
            debug!(key, size, max_size = self.max_size, "entry larger than cache; not stored");
            return Ok(());
        }

        let mut state = self.lock();
        state.remove(key);
        let tick = state.next_tick;
        state.next_tick += 1;
        state.order.insert(tick, key.to_owned());
        state.entries.insert(key.to_owned(), Entry { value, tick });
        state.size += size;

        let evicted = state.evict_to(self.max_size);
        if evicted > 0 {
            debug!(evicted, size = state.size, "evicted least recently used entries");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(len: usize) -> Bytes {
        Bytes::from(vec![b'x'; len])
    }

    #[tokio::test]
    async fn write_then_lookup() {
        let cache = InMemoryCache::unbounded();
        assert_eq!(cache.lookup("a").await.unwrap(), Lookup::Miss);

        cache.write("a", Bytes::from_static(b"one")).await.unwrap();
        assert_eq!(
            cache.lookup("a").await.unwrap(),
            Lookup::Hit(Bytes::from_static(b"one"))
        );
        assert_eq!(cache.size(), 4);
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        // Each entry is 1 key byte + 9 value bytes.
        let cache = InMemoryCache::new(30);
        cache.write("a", value(9)).await.unwrap();
        cache.write("b", value(9)).await.unwrap();
        cache.write("c", value(9)).await.unwrap();

        // Refresh "a" so "b" becomes the oldest.
        assert!(cache.lookup("a").await.unwrap().is_hit());
        cache.write("d", value(9)).await.unwrap();

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
        assert_eq!(cache.size(), 30);
    }

    #[tokio::test]
    async fn oversized_entry_is_not_stored() {
        let cache = InMemoryCache::new(8);
        cache.write("k", value(4)).await.unwrap();
        cache.write("big", value(16)).await.unwrap();
        assert!(!cache.contains("big"));
        assert!(cache.contains("k"));
    }

    #[tokio::test]
    async fn rewriting_a_key_does_not_double_count() {
        let cache = InMemoryCache::new(100);
        cache.write("k", value(10)).await.unwrap();
        cache.write("k", value(10)).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size(), 11);
    }

    #[tokio::test]
    async fn get_reports_miss_as_key_not_found() {
        let cache = InMemoryCache::unbounded();
        let err = cache.get("nope").await.unwrap_err();
        assert!(matches!(err, crate::CacheError::KeyNotFound(key) if key == "nope"));
    }
}
