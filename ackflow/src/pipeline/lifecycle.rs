//! Stop and done signalling shared between a component handle and its tasks.

use crate::errors::{PipelineError, PipelineResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Tracks whether a stop was requested and whether the worker has exited.
///
/// Both flags only ever move from false to true.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    stop: watch::Sender<bool>,
    done: watch::Sender<bool>,
}

impl Lifecycle {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            stop: watch::channel(false).0,
            done: watch::channel(false).0,
        })
    }

    /// Requests a stop. Returns true only for the first request.
    pub(crate) fn request_stop(&self) -> bool {
        self.stop.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        })
    }

    pub(crate) fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    pub(crate) fn stop_signal(&self) -> StopSignal {
        StopSignal {
            rx: self.stop.subscribe(),
        }
    }

    pub(crate) fn mark_done(&self) {
        self.done.send_replace(true);
    }

    pub(crate) fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    /// Waits until the worker has exited.
    pub(crate) async fn wait_done(&self, timeout: Duration) -> PipelineResult<()> {
        let mut rx = self.done.subscribe();
        let result = match tokio::time::timeout(timeout, rx.wait_for(|done| *done)).await {
            Ok(_) => Ok(()),
            Err(_) => Err(PipelineError::Timeout),
        };
        result
    }
}

/// Marks the lifecycle done when dropped, including on panic.
pub(crate) struct DoneGuard(pub(crate) Arc<Lifecycle>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.mark_done();
    }
}

/// The receiving side of a stop request.
#[derive(Debug)]
pub(crate) struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Resolves once a stop has been requested.
    pub(crate) async fn stopped(&mut self) {
        // An error means the lifecycle is gone, which also means stop.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_idempotent() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.stop_requested());
        assert!(lifecycle.request_stop());
        assert!(!lifecycle.request_stop());
        assert!(lifecycle.stop_requested());
    }

    #[tokio::test]
    async fn test_stop_signal_resolves() {
        let lifecycle = Lifecycle::new();
        let mut signal = lifecycle.stop_signal();
        lifecycle.request_stop();
        tokio::time::timeout(Duration::from_secs(1), signal.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_done_times_out_then_succeeds() {
        let lifecycle = Lifecycle::new();
        assert_eq!(
            lifecycle.wait_done(Duration::from_millis(10)).await,
            Err(PipelineError::Timeout)
        );

        drop(DoneGuard(lifecycle.clone()));
        assert!(lifecycle.is_done());
        assert_eq!(lifecycle.wait_done(Duration::from_millis(10)).await, Ok(()));
    }
}
