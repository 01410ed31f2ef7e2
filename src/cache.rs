use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long a fetched query is served from memory before it is fetched again.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

/// Hierarchical key of a cached query, e.g. `["explore", "waec", "a1", "questions"]`.
pub type QueryKey = Vec<String>;

struct CacheEntry {
    value: Value,
    fetched_at: Instant,
}

/// Read-through cache of decoded JSON payloads.
///
/// Mutations drop every entry below a key prefix, so the next read goes back
/// to the server.
pub struct QueryCache {
    stale_time: Duration,
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
}

impl Default for QueryCache {
    fn default() -> Self {
        QueryCache::new(DEFAULT_STALE_TIME)
    }
}

impl QueryCache {
    /// Creates an empty cache serving entries for `stale_time`.
    pub fn new(stale_time: Duration) -> Self {
        QueryCache {
            stale_time,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    /// Returns the fresh cached value for `key`, if any.
    ///
    /// An entry found past its stale time is removed from the map.
    pub fn get(&self, key: &[String]) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let fresh = entries
            .get(key)
            .map(|entry| entry.fetched_at.elapsed() < self.stale_time)?;
        if fresh {
            entries.get(key).map(|entry| entry.value.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    /// Stores `value` under `key`, stamped with the current time.
    ///
    /// Replaces any previous entry for the same key.
    pub fn insert(&self, key: QueryKey, value: Value) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Serves `key` from memory or runs `fetch` and stores its result.
    ///
    /// Errors are never cached.
    pub fn get_or_fetch<E, F>(&self, key: QueryKey, fetch: F) -> Result<Value, E>
    where
        F: FnOnce() -> Result<Value, E>,
    {
        if let Some(value) = self.get(&key) {
            debug!("cache hit {:?}", key);
            return Ok(value);
        }
        debug!("cache miss {:?}", key);
        // The lock is not held while fetching; two readers may both fetch.
        let value = fetch()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Drops every entry whose key starts with `prefix`. Returns how many were removed.
    pub fn invalidate(&self, prefix: &[String]) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        debug!("invalidated {} cached queries under {:?}", removed, prefix);
        removed
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Number of stored entries, stale ones included until they are read.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds a query key from string-like segments.
pub fn query_key<I, S>(segments: I) -> QueryKey
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    segments.into_iter().map(Into::into).collect()
}
