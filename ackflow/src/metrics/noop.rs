//! Metrics backend that discards everything.

use super::{
    Counter, CounterVec, Gauge, GaugeVec, Metrics, StatCounter, StatGauge, StatTimer, StatVec,
    Timer, TimerVec,
};
use std::sync::Arc;
use std::time::Duration;

/// A stat that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStat;

impl StatCounter for NoopStat {
    fn incr(&self, _count: i64) {}
}

impl StatGauge for NoopStat {
    fn set(&self, _value: i64) {}
    fn incr(&self, _count: i64) {}
    fn decr(&self, _count: i64) {}
}

impl StatTimer for NoopStat {
    fn timing(&self, _delta: Duration) {}
}

impl StatVec<dyn StatCounter> for NoopStat {
    fn with(&self, _values: &[&str]) -> Counter {
        Arc::new(Self)
    }
}

impl StatVec<dyn StatGauge> for NoopStat {
    fn with(&self, _values: &[&str]) -> Gauge {
        Arc::new(Self)
    }
}

impl StatVec<dyn StatTimer> for NoopStat {
    fn with(&self, _values: &[&str]) -> Timer {
        Arc::new(Self)
    }
}

/// A metrics backend that discards all stats.
///
/// Used as the default when no backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl NoopMetrics {
    /// Returns a shareable no-op backend.
    #[must_use]
    pub fn shared() -> Arc<dyn Metrics> {
        Arc::new(Self)
    }
}

impl Metrics for NoopMetrics {
    fn counter(&self, _path: &str) -> Counter {
        Arc::new(NoopStat)
    }

    fn counter_vec(&self, _path: &str, _labels: &[&str]) -> CounterVec {
        Arc::new(NoopStat)
    }

    fn gauge(&self, _path: &str) -> Gauge {
        Arc::new(NoopStat)
    }

    fn gauge_vec(&self, _path: &str, _labels: &[&str]) -> GaugeVec {
        Arc::new(NoopStat)
    }

    fn timer(&self, _path: &str) -> Timer {
        Arc::new(NoopStat)
    }

    fn timer_vec(&self, _path: &str, _labels: &[&str]) -> TimerVec {
        Arc::new(NoopStat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_metrics() {
        let metrics = NoopMetrics::shared();
        metrics.counter("a").incr(1);
        metrics.gauge("b").set(5);
        metrics.timer("c").timing(Duration::from_millis(1));
        metrics.counter_vec("d", &["x"]).with(&["1", "2"]).incr(1);
        // Should not panic
    }
}
