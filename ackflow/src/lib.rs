//! # Ackflow
//!
//! A message pipeline engine that keeps delivery acknowledgements intact.
//!
//! Ackflow runs messages through chains of stages in parallel while
//! guaranteeing that every inbound transaction receives exactly one response:
//!
//! - **Transactions**: a message paired with a single-use response path
//! - **Processors**: one lane running a stage chain, fanning results out and
//!   reducing their acknowledgements back into one
//! - **Pools**: parallel lanes behind one input and one output, resizable at
//!   runtime and drained gracefully on close
//! - **Capabilities**: stage, cache, condition, metrics, source and sink traits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ackflow::prelude::*;
//!
//! let pool = Pool::with_stages(
//!     |_| vec![Box::new(NoOpStage::default()) as Box<dyn Stage>],
//!     &PoolConfig::new().with_threads(4),
//!     NoopMetrics::shared(),
//! )?;
//! let mut results = pool.transaction_chan().unwrap();
//!
//! let (tx, rx) = transaction_channel(1);
//! pool.consume(rx)?;
//!
//! let (tran, response) = Transaction::new(Message::new(["hello"]));
//! tx.send(tran).await?;
//! results.recv().await.unwrap().ack();
//! assert!(response.recv().await?.is_ack());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cache;
pub mod condition;
pub mod config;
pub mod errors;
pub mod message;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod stages;
pub mod testing;
pub mod transaction;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{Cache, FileCache, MemoryCache};
    pub use crate::condition::{Condition, CountCondition, StaticCondition};
    pub use crate::config::{Config, FileCacheConfig, LogConfig, MemoryCacheConfig, PoolConfig};
    pub use crate::errors::{
        AckflowError, CacheError, ConfigError, PipelineError, PipelineResult, ResponseError,
    };
    pub use crate::message::{Message, Part};
    pub use crate::metrics::{LocalMetrics, Metrics, NoopMetrics};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{Pipeline, Pool, Processor};
    pub use crate::ports::{Sink, Source};
    pub use crate::stages::{FnStage, GateStage, NoOpStage, Stage, StageOutcome};
    pub use crate::transaction::{
        transaction_channel, Response, ResponseReceiver, Transaction, TransactionReceiver,
        TransactionSender,
    };
}
