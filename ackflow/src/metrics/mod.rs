//! Metrics capability consumed by the engine.
//!
//! Three stat kinds are available: counters, gauges and timers. Each can be
//! obtained plain, or as a labelled vector whose label values are bound at
//! the point of use with [`StatVec::with`]. Binding a number of values that
//! does not match the number of label names yields a no-op stat: nothing is
//! emitted and no error is raised.

mod local;
mod noop;

pub use local::{LocalMetrics, TimingSummary};
pub use noop::NoopMetrics;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonically increasing count.
pub trait StatCounter: Send + Sync {
    /// Increments the counter by `count`.
    fn incr(&self, count: i64);
}

/// A value that can go up and down.
pub trait StatGauge: Send + Sync {
    /// Sets the gauge to `value`.
    fn set(&self, value: i64);

    /// Increments the gauge by `count`.
    fn incr(&self, count: i64);

    /// Decrements the gauge by `count`.
    fn decr(&self, count: i64);
}

/// A latency measurement.
pub trait StatTimer: Send + Sync {
    /// Records one timing.
    fn timing(&self, delta: Duration);
}

/// A family of stats sharing a path and a fixed set of label names.
pub trait StatVec<T: ?Sized>: Send + Sync {
    /// Binds label values, in label-name order, and returns the stat.
    fn with(&self, values: &[&str]) -> Arc<T>;
}

/// Shared handle to a counter.
pub type Counter = Arc<dyn StatCounter>;
/// Shared handle to a gauge.
pub type Gauge = Arc<dyn StatGauge>;
/// Shared handle to a timer.
pub type Timer = Arc<dyn StatTimer>;
/// Shared handle to a labelled counter family.
pub type CounterVec = Arc<dyn StatVec<dyn StatCounter>>;
/// Shared handle to a labelled gauge family.
pub type GaugeVec = Arc<dyn StatVec<dyn StatGauge>>;
/// Shared handle to a labelled timer family.
pub type TimerVec = Arc<dyn StatVec<dyn StatTimer>>;

/// A metrics backend.
pub trait Metrics: Send + Sync + Debug {
    /// Returns a counter for a path.
    fn counter(&self, path: &str) -> Counter;

    /// Returns a labelled counter family for a path.
    fn counter_vec(&self, path: &str, labels: &[&str]) -> CounterVec;

    /// Returns a gauge for a path.
    fn gauge(&self, path: &str) -> Gauge;

    /// Returns a labelled gauge family for a path.
    fn gauge_vec(&self, path: &str, labels: &[&str]) -> GaugeVec;

    /// Returns a timer for a path.
    fn timer(&self, path: &str) -> Timer;

    /// Returns a labelled timer family for a path.
    fn timer_vec(&self, path: &str, labels: &[&str]) -> TimerVec;
}

/// Measures the time since creation and records it on a timer.
pub struct TimerGuard {
    timer: Timer,
    started: Instant,
}

impl TimerGuard {
    /// Starts measuring.
    #[must_use]
    pub fn start(timer: Timer) -> Self {
        Self {
            timer,
            started: Instant::now(),
        }
    }

    /// Stops measuring and records the elapsed time.
    pub fn stop(self) -> Duration {
        let elapsed = self.started.elapsed();
        self.timer.timing(elapsed);
        elapsed
    }
}

/// Pairs label names with values.
///
/// Returns `None` when the counts do not match; callers must then emit
/// nothing.
#[must_use]
pub fn pair_labels(names: &[String], values: &[&str]) -> Option<Vec<(String, String)>> {
    if names.len() != values.len() {
        return None;
    }
    Some(
        names
            .iter()
            .zip(values)
            .map(|(n, v)| (n.clone(), (*v).to_string()))
            .collect(),
    )
}

/// A stat family built from a closure over bound labels.
pub struct FnStatVec<T: ?Sized> {
    names: Vec<String>,
    build: Box<dyn Fn(Vec<(String, String)>) -> Arc<T> + Send + Sync>,
    fallback: Arc<T>,
}

impl<T: ?Sized> FnStatVec<T> {
    /// Creates a family; `fallback` is handed out on label mismatches.
    pub fn new<F>(labels: &[&str], fallback: Arc<T>, build: F) -> Self
    where
        F: Fn(Vec<(String, String)>) -> Arc<T> + Send + Sync + 'static,
    {
        Self {
            names: labels.iter().map(|l| (*l).to_string()).collect(),
            build: Box::new(build),
            fallback,
        }
    }
}

impl<T: ?Sized + Send + Sync> StatVec<T> for FnStatVec<T> {
    fn with(&self, values: &[&str]) -> Arc<T> {
        match pair_labels(&self.names, values) {
            Some(pairs) => (self.build)(pairs),
            None => self.fallback.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_labels() {
        let names = vec!["lane".to_string(), "stage".to_string()];
        assert_eq!(
            pair_labels(&names, &["0", "gate"]),
            Some(vec![
                ("lane".to_string(), "0".to_string()),
                ("stage".to_string(), "gate".to_string()),
            ])
        );
        assert_eq!(pair_labels(&names, &["0"]), None);
        assert_eq!(pair_labels(&[], &[]), Some(vec![]));
    }

    #[test]
    fn test_timer_guard_records() {
        let metrics = LocalMetrics::new();
        let guard = TimerGuard::start(metrics.timer("op"));
        let elapsed = guard.stop();

        let summary = metrics.timing("op").unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.total, elapsed);
    }
}
