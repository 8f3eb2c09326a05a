//! Source and sink capabilities at the edges of a pipeline.
//!
//! Concrete adapters for queues, sockets or files implement these; the
//! engine only ever sees transaction streams.

use crate::errors::PipelineResult;
use crate::transaction::TransactionReceiver;
use async_trait::async_trait;
use std::time::Duration;

/// Produces transactions.
///
/// Each transaction read from the source must be answered with exactly one
/// response before the source may forget about the message.
#[async_trait]
pub trait Source: Send + Sync {
    /// Takes the stream of transactions. Returns `None` once taken.
    fn transaction_chan(&self) -> Option<TransactionReceiver>;

    /// Returns true while the source is connected to its upstream.
    fn connected(&self) -> bool;

    /// Requests a shutdown without waiting for it. Idempotent.
    fn close_async(&self);

    /// Waits for the shutdown to complete, failing with a timeout error if
    /// it does not within `timeout`.
    async fn wait_for_close(&self, timeout: Duration) -> PipelineResult<()>;
}

/// Consumes transactions and answers each of them.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Binds the input stream. A second call fails with
    /// [`PipelineError::AlreadyConsuming`](crate::errors::PipelineError::AlreadyConsuming).
    ///
    /// # Panics
    ///
    /// Sinks running a worker task panic when called outside a Tokio runtime.
    fn consume(&self, input: TransactionReceiver) -> PipelineResult<()>;

    /// Returns true while the sink is connected to its downstream.
    fn connected(&self) -> bool;

    /// Requests a shutdown without waiting for it. Idempotent.
    fn close_async(&self);

    /// Waits for the shutdown to complete, failing with a timeout error if
    /// it does not within `timeout`.
    async fn wait_for_close(&self, timeout: Duration) -> PipelineResult<()>;
}
