//! In-memory cache with lazy compaction.

use super::Cache;
use crate::config::MemoryCacheConfig;
use crate::errors::{CacheError, CacheResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone)]
struct Item {
    value: Vec<u8>,
    /// `None` for items that never expire.
    expires_at: Option<Instant>,
}

#[derive(Debug)]
struct State {
    items: HashMap<String, Item>,
    last_compaction: Instant,
}

/// A cache held in process memory.
///
/// Written items expire after the configured TTL. Expired items are removed
/// by compaction, which runs on a write once the compaction interval has
/// elapsed since the previous one. Reads do not check expiry.
#[derive(Debug)]
pub struct MemoryCache {
    ttl: Duration,
    compaction_interval: Duration,
    state: Mutex<State>,
}

impl MemoryCache {
    /// Creates a memory cache from configuration.
    #[must_use]
    pub fn new(config: &MemoryCacheConfig) -> Self {
        let items = config
            .init_values
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    Item {
                        value: v.as_bytes().to_vec(),
                        expires_at: None,
                    },
                )
            })
            .collect();

        Self {
            ttl: config.ttl(),
            compaction_interval: config.compaction_interval(),
            state: Mutex::new(State {
                items,
                last_compaction: Instant::now(),
            }),
        }
    }

    /// Returns the number of items currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns true if the cache holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    fn compact(&self, state: &mut State) {
        let now = Instant::now();
        if now.duration_since(state.last_compaction) < self.compaction_interval {
            return;
        }
        let before = state.items.len();
        state
            .items
            .retain(|_, item| item.expires_at.map_or(true, |at| at > now));
        state.last_compaction = now;
        trace!(removed = before - state.items.len(), "Compacted memory cache");
    }

    fn item(&self, value: Vec<u8>) -> Item {
        Item {
            value,
            expires_at: Some(Instant::now() + self.ttl),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(&MemoryCacheConfig::default())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        self.state
            .lock()
            .items
            .get(key)
            .map(|item| item.value.clone())
            .ok_or(CacheError::KeyNotFound)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> CacheResult<()> {
        let item = self.item(value);
        let mut state = self.state.lock();
        self.compact(&mut state);
        state.items.insert(key.to_string(), item);
        Ok(())
    }

    async fn set_multi(&self, items: HashMap<String, Vec<u8>>) -> CacheResult<()> {
        let mut state = self.state.lock();
        self.compact(&mut state);
        for (key, value) in items {
            let item = self.item(value);
            state.items.insert(key, item);
        }
        Ok(())
    }

    async fn add(&self, key: &str, value: Vec<u8>) -> CacheResult<()> {
        let item = self.item(value);
        let mut state = self.state.lock();
        self.compact(&mut state);
        if state.items.contains_key(key) {
            return Err(CacheError::KeyAlreadyExists);
        }
        state.items.insert(key.to_string(), item);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut state = self.state.lock();
        self.compact(&mut state);
        state.items.remove(key);
        Ok(())
    }
}
