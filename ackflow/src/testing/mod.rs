//! Testing utilities for ackflow pipelines.
//!
//! This module provides:
//! - Mock sources and sinks implementing the port traits
//! - Stages whose behaviour tests can switch at runtime

mod mocks;
mod stages;

pub use mocks::{AckingSink, MockSink, MockSource};
pub use stages::{DropSwitch, FanOut};
