//! Key/value cache capability used by stages.
//!
//! The pipeline engine itself never touches a cache; stages that need
//! shared state (deduplication, enrichment) are handed one.

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use crate::errors::CacheResult;
use async_trait::async_trait;
use std::collections::HashMap;

/// A key/value store.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the value of a key.
    ///
    /// Fails with [`CacheError::KeyNotFound`](crate::errors::CacheError::KeyNotFound)
    /// if the key does not exist.
    async fn get(&self, key: &str) -> CacheResult<Vec<u8>>;

    /// Sets the value of a key, overwriting any existing value.
    async fn set(&self, key: &str, value: Vec<u8>) -> CacheResult<()>;

    /// Sets several keys. Stops at the first failure.
    async fn set_multi(&self, items: HashMap<String, Vec<u8>>) -> CacheResult<()> {
        for (key, value) in items {
            self.set(&key, value).await?;
        }
        Ok(())
    }

    /// Sets the value of a key only if it does not exist yet.
    ///
    /// Fails with [`CacheError::KeyAlreadyExists`](crate::errors::CacheError::KeyAlreadyExists)
    /// otherwise.
    async fn add(&self, key: &str, value: Vec<u8>) -> CacheResult<()>;

    /// Removes a key. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> CacheResult<()>;
}
