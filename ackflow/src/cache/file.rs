//! File system backed cache.

use super::Cache;
use crate::config::FileCacheConfig;
use crate::errors::{CacheError, CacheResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// A cache storing each item as a file named by its key.
///
/// There is no expiry or garbage collection; intended for development and
/// debugging. Keys must be plain file names: empty keys, `.`, `..` and keys
/// containing a path separator are rejected with [`CacheError::InvalidKey`].
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Creates a file cache from configuration.
    #[must_use]
    pub fn new(config: &FileCacheConfig) -> Self {
        Self {
            dir: config.directory.clone(),
        }
    }

    /// Returns the directory items are stored in.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> CacheResult<PathBuf> {
        let mut components = Path::new(key).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == key => Ok(self.dir.join(key)),
            _ => Err(CacheError::InvalidKey(key.to_string())),
        }
    }
}

#[async_trait]
impl Cache for FileCache {
    async fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        match fs::read(self.path(key)?).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CacheError::KeyNotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> CacheResult<()> {
        fs::write(self.path(key)?, value).await?;
        Ok(())
    }

    async fn add(&self, key: &str, value: Vec<u8>) -> CacheResult<()> {
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(key)?)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(CacheError::KeyAlreadyExists)
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&value).await?;
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        match fs::remove_file(self.path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
