//! Error types for the ackflow engine.
//!
//! Errors are split by where they travel:
//!
//! - [`ResponseError`] is carried inside a [`Response`](crate::transaction::Response)
//!   back to the sender of a transaction. It never crosses a pipeline boundary
//!   as a fault.
//! - [`PipelineError`] is returned synchronously from lifecycle calls
//!   (binding, resizing, shutdown) and from awaiting a response path.
//! - [`CacheError`] is returned by [`Cache`](crate::cache::Cache) implementations.

use thiserror::Error;

/// The main error type for ackflow operations.
#[derive(Debug, Error)]
pub enum AckflowError {
    /// A pipeline lifecycle error occurred.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// A cache operation failed.
    #[error("{0}")]
    Cache(#[from] CacheError),

    /// A configuration document could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A transaction was resolved with a failure.
    #[error("{0}")]
    Response(#[from] ResponseError),
}

/// The failure reason carried by a negative [`Response`](crate::transaction::Response).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// A stage deliberately vetoed the message.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// A result transaction was dropped without ever being answered.
    #[error("transaction abandoned without a response")]
    Abandoned,

    /// A downstream consumer failed to deliver the message.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// A stage failed while processing the message.
    #[error("stage failed: {0}")]
    Stage(String),
}

impl ResponseError {
    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Creates a delivery error.
    #[must_use]
    pub fn delivery(reason: impl Into<String>) -> Self {
        Self::Delivery(reason.into())
    }

    /// Creates a stage error.
    #[must_use]
    pub fn stage(reason: impl Into<String>) -> Self {
        Self::Stage(reason.into())
    }

    /// Returns true if this is a deliberate rejection rather than a fault.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Errors raised by pipeline lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The input of a component was bound more than once.
    #[error("already consuming an input")]
    AlreadyConsuming,

    /// A shutdown or response wait did not complete in time.
    #[error("action timed out")]
    Timeout,

    /// A response path closed without delivering a response.
    #[error("response path closed without a response")]
    Abandoned,

    /// A pool was asked to run with an unusable number of lanes.
    #[error("invalid pool size: {0}")]
    InvalidSize(usize),

    /// The component has already shut down.
    #[error("pipeline is closed")]
    Closed,

    /// A lane could not be constructed.
    #[error("failed to construct lane: {0}")]
    Construction(String),
}

impl PipelineError {
    /// Returns true if the error is a timeout and the wait may be retried.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Errors raised by cache implementations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The requested key does not exist.
    #[error("key does not exist")]
    KeyNotFound,

    /// A create-only write targeted a key that already exists.
    #[error("key already exists")]
    KeyAlreadyExists,

    /// The key cannot be used by this cache.
    #[error("invalid key '{0}'")]
    InvalidKey(String),

    /// The backing store failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised when a configuration document cannot be parsed.
#[derive(Debug, Error)]
#[error("invalid configuration: {message}")]
pub struct ConfigError {
    /// The parse failure description.
    pub message: String,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Result alias for pipeline lifecycle operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
