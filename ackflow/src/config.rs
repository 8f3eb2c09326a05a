//! Configuration types for the engine and its reference collaborators.
//!
//! These carry tuning knobs only. How stages are composed into a chain is
//! decided in code, not in configuration.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of parallel lanes.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Capacity of each lane's input channel.
    #[serde(default = "default_buffer")]
    pub lane_buffer: usize,
    /// Capacity of each output channel.
    #[serde(default = "default_buffer")]
    pub output_buffer: usize,
}

fn default_threads() -> usize {
    1
}

fn default_buffer() -> usize {
    1
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            lane_buffer: default_buffer(),
            output_buffer: default_buffer(),
        }
    }
}

impl PoolConfig {
    /// Creates a pool configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of lanes.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the lane input capacity.
    #[must_use]
    pub fn with_lane_buffer(mut self, capacity: usize) -> Self {
        self.lane_buffer = capacity;
        self
    }

    /// Sets the output capacity.
    #[must_use]
    pub fn with_output_buffer(mut self, capacity: usize) -> Self {
        self.output_buffer = capacity;
        self
    }
}

/// Configuration for the in-memory cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Lifetime of written items in seconds. Expired items are removed by
    /// compaction.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Minimum time between compactions in seconds. Zero compacts on every
    /// write.
    #[serde(default = "default_compaction_interval")]
    pub compaction_interval_seconds: u64,
    /// Items present from the start. These never expire.
    #[serde(default)]
    pub init_values: HashMap<String, String>,
}

fn default_ttl() -> u64 {
    300
}

fn default_compaction_interval() -> u64 {
    60
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            compaction_interval_seconds: default_compaction_interval(),
            init_values: HashMap::new(),
        }
    }
}

impl MemoryCacheConfig {
    /// Creates a memory cache configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the item lifetime.
    #[must_use]
    pub fn with_ttl_seconds(mut self, ttl: u64) -> Self {
        self.ttl_seconds = ttl;
        self
    }

    /// Sets the compaction interval.
    #[must_use]
    pub fn with_compaction_interval_seconds(mut self, interval: u64) -> Self {
        self.compaction_interval_seconds = interval;
        self
    }

    /// Adds an initial value.
    #[must_use]
    pub fn with_init_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.init_values.insert(key.into(), value.into());
        self
    }

    /// Returns the item lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Returns the compaction interval.
    #[must_use]
    pub fn compaction_interval(&self) -> Duration {
        Duration::from_secs(self.compaction_interval_seconds)
    }
}

/// Configuration for the file cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCacheConfig {
    /// Directory in which each item is stored as a file.
    #[serde(default)]
    pub directory: PathBuf,
}

impl FileCacheConfig {
    /// Creates a file cache configuration for a directory.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

/// Configuration for log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `ackflow=debug`. Overridden by
    /// `RUST_LOG` when set.
    #[serde(default = "default_level")]
    pub level: String,
    /// Whether to emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Sets the filter directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Enables JSON output.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool settings.
    #[serde(default)]
    pub pipeline: PoolConfig,
    /// In-memory cache settings.
    #[serde(default)]
    pub memory_cache: MemoryCacheConfig,
    /// File cache settings.
    #[serde(default)]
    pub file_cache: FileCacheConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LogConfig,
}

impl Config {
    /// Parses a JSON configuration document. Missing fields take defaults.
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Renders the configuration as pretty JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
