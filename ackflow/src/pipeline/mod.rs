//! The pipeline execution engine.
//!
//! This module provides:
//! - The [`Pipeline`] lifecycle shared by every engine component
//! - [`Processor`], a single lane running a stage chain
//! - [`Pool`], parallel lanes behind one input and one output

#[cfg(test)]
mod integration_tests;
pub(crate) mod lifecycle;
mod pool;
mod processor;

pub use pool::Pool;
pub use processor::Processor;

use crate::errors::PipelineResult;
use crate::transaction::TransactionReceiver;
use async_trait::async_trait;
use std::time::Duration;

/// A component that consumes a transaction stream and emits one.
///
/// Every transaction read from the input receives exactly one response,
/// whatever happens to the results emitted for it.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Binds the input stream and starts working on it.
    ///
    /// Fails with [`PipelineError::AlreadyConsuming`](crate::errors::PipelineError::AlreadyConsuming)
    /// if an input is already bound, in which case `input` is dropped and the
    /// existing binding is left alone.
    ///
    /// # Panics
    ///
    /// Implementations spawn their workers with [`tokio::spawn`], so this
    /// panics when called outside a Tokio runtime.
    fn consume(&self, input: TransactionReceiver) -> PipelineResult<()>;

    /// Takes the output stream. Returns `None` once it has been taken.
    fn transaction_chan(&self) -> Option<TransactionReceiver>;

    /// Requests a shutdown without waiting for it.
    ///
    /// Transactions already accepted are still completed. Calling this more
    /// than once has no further effect.
    fn close_async(&self);

    /// Waits for the shutdown to complete.
    ///
    /// Fails with [`PipelineError::Timeout`](crate::errors::PipelineError::Timeout)
    /// if it does not complete within `timeout`; waiting again is allowed.
    async fn wait_for_close(&self, timeout: Duration) -> PipelineResult<()>;
}

#[async_trait]
impl<P: Pipeline + ?Sized> Pipeline for Box<P> {
    fn consume(&self, input: TransactionReceiver) -> PipelineResult<()> {
        (**self).consume(input)
    }

    fn transaction_chan(&self) -> Option<TransactionReceiver> {
        (**self).transaction_chan()
    }

    fn close_async(&self) {
        (**self).close_async();
    }

    async fn wait_for_close(&self, timeout: Duration) -> PipelineResult<()> {
        (**self).wait_for_close(timeout).await
    }
}

#[async_trait]
impl<P: Pipeline + ?Sized> Pipeline for std::sync::Arc<P> {
    fn consume(&self, input: TransactionReceiver) -> PipelineResult<()> {
        (**self).consume(input)
    }

    fn transaction_chan(&self) -> Option<TransactionReceiver> {
        (**self).transaction_chan()
    }

    fn close_async(&self) {
        (**self).close_async();
    }

    async fn wait_for_close(&self, timeout: Duration) -> PipelineResult<()> {
        (**self).wait_for_close(timeout).await
    }
}
