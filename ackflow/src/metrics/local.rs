//! In-process metrics backend.

use super::noop::NoopStat;
use super::{
    Counter, CounterVec, FnStatVec, Gauge, GaugeVec, Metrics, StatCounter, StatGauge, StatTimer,
    Timer, TimerVec,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Aggregated timings recorded under one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingSummary {
    /// Number of timings recorded.
    pub count: u64,
    /// Sum of all timings.
    pub total: Duration,
    /// Largest single timing.
    pub max: Duration,
}

#[derive(Debug, Default)]
struct LocalStore {
    counters: DashMap<String, i64>,
    gauges: DashMap<String, i64>,
    timings: DashMap<String, TimingSummary>,
}

/// Renders a stat key such as `path{lane=0,stage=gate}`.
fn render_key(path: &str, labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return path.to_string();
    }
    let rendered: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{path}{{{}}}", rendered.join(","))
}

struct LocalStat {
    key: String,
    store: Arc<LocalStore>,
}

impl StatCounter for LocalStat {
    fn incr(&self, count: i64) {
        *self.store.counters.entry(self.key.clone()).or_insert(0) += count;
    }
}

impl StatGauge for LocalStat {
    fn set(&self, value: i64) {
        self.store.gauges.insert(self.key.clone(), value);
    }

    fn incr(&self, count: i64) {
        *self.store.gauges.entry(self.key.clone()).or_insert(0) += count;
    }

    fn decr(&self, count: i64) {
        *self.store.gauges.entry(self.key.clone()).or_insert(0) -= count;
    }
}

impl StatTimer for LocalStat {
    fn timing(&self, delta: Duration) {
        let mut entry = self.store.timings.entry(self.key.clone()).or_default();
        entry.count += 1;
        entry.total += delta;
        entry.max = entry.max.max(delta);
    }
}

/// A metrics backend that keeps every stat in memory.
///
/// Cloning shares the underlying store, so a clone handed to a pipeline can
/// be inspected from the outside.
#[derive(Debug, Clone, Default)]
pub struct LocalMetrics {
    store: Arc<LocalStore>,
}

impl LocalMetrics {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn stat(&self, path: &str, labels: &[(String, String)]) -> Arc<LocalStat> {
        Arc::new(LocalStat {
            key: render_key(path, labels),
            store: self.store.clone(),
        })
    }

    /// Returns a counter value by rendered key.
    #[must_use]
    pub fn counter_value(&self, key: &str) -> Option<i64> {
        self.store.counters.get(key).map(|v| *v)
    }

    /// Returns a gauge value by rendered key.
    #[must_use]
    pub fn gauge_value(&self, key: &str) -> Option<i64> {
        self.store.gauges.get(key).map(|v| *v)
    }

    /// Returns the timing summary for a rendered key.
    #[must_use]
    pub fn timing(&self, key: &str) -> Option<TimingSummary> {
        self.store.timings.get(key).map(|v| *v)
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn counters(&self) -> HashMap<String, i64> {
        self.store
            .counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    /// Returns a snapshot of all gauges.
    #[must_use]
    pub fn gauges(&self) -> HashMap<String, i64> {
        self.store
            .gauges
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    /// Converts all stats to a JSON document.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let timings: serde_json::Map<String, serde_json::Value> = self
            .store
            .timings
            .iter()
            .map(|e| {
                let t = e.value();
                (
                    e.key().clone(),
                    serde_json::json!({
                        "count": t.count,
                        "total_ms": t.total.as_secs_f64() * 1000.0,
                        "max_ms": t.max.as_secs_f64() * 1000.0,
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "counters": self.counters(),
            "gauges": self.gauges(),
            "timings": timings,
        })
    }
}

impl Metrics for LocalMetrics {
    fn counter(&self, path: &str) -> Counter {
        self.stat(path, &[])
    }

    fn counter_vec(&self, path: &str, labels: &[&str]) -> CounterVec {
        let this = self.clone();
        let path = path.to_string();
        Arc::new(FnStatVec::<dyn StatCounter>::new(
            labels,
            Arc::new(NoopStat),
            move |pairs| -> Counter { this.stat(&path, &pairs) },
        ))
    }

    fn gauge(&self, path: &str) -> Gauge {
        self.stat(path, &[])
    }

    fn gauge_vec(&self, path: &str, labels: &[&str]) -> GaugeVec {
        let this = self.clone();
        let path = path.to_string();
        Arc::new(FnStatVec::<dyn StatGauge>::new(
            labels,
            Arc::new(NoopStat),
            move |pairs| -> Gauge { this.stat(&path, &pairs) },
        ))
    }

    fn timer(&self, path: &str) -> Timer {
        self.stat(path, &[])
    }

    fn timer_vec(&self, path: &str, labels: &[&str]) -> TimerVec {
        let this = self.clone();
        let path = path.to_string();
        Arc::new(FnStatVec::<dyn StatTimer>::new(
            labels,
            Arc::new(NoopStat),
            move |pairs| -> Timer { this.stat(&path, &pairs) },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_counter_accumulates() {
        let metrics = LocalMetrics::new();
        let counter = metrics.counter("pipeline.count");
        counter.incr(1);
        counter.incr(2);
        assert_eq!(metrics.counter_value("pipeline.count"), Some(3));
    }

    #[test]
    fn test_gauge_moves() {
        let metrics = LocalMetrics::new();
        let gauge = metrics.gauge("pool.lanes");
        gauge.set(4);
        gauge.incr(1);
        gauge.decr(2);
        assert_eq!(metrics.gauge_value("pool.lanes"), Some(3));
    }

    #[test]
    fn test_labelled_counter() {
        let metrics = LocalMetrics::new();
        let vec = metrics.counter_vec("lane.received", &["lane"]);
        vec.with(&["0"]).incr(1);
        vec.with(&["1"]).incr(5);

        assert_eq!(metrics.counter_value("lane.received{lane=0}"), Some(1));
        assert_eq!(metrics.counter_value("lane.received{lane=1}"), Some(5));
    }

    #[test]
    fn test_label_mismatch_emits_nothing() {
        let metrics = LocalMetrics::new();
        metrics.counter_vec("a", &["x", "y"]).with(&["1"]).incr(1);
        metrics.gauge_vec("b", &["x"]).with(&["1", "2"]).set(1);
        metrics.timer_vec("c", &["x"]).with(&[]).timing(Duration::from_millis(1));

        assert!(metrics.counters().is_empty());
        assert!(metrics.gauges().is_empty());
        assert!(metrics.timing("c").is_none());
    }

    #[test]
    fn test_timings_summarised() {
        let metrics = LocalMetrics::new();
        let timer = metrics.timer_vec("latency", &["lane"]).with(&["2"]);
        timer.timing(Duration::from_millis(3));
        timer.timing(Duration::from_millis(7));

        let summary = metrics.timing("latency{lane=2}").unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.total, Duration::from_millis(10));
        assert_eq!(summary.max, Duration::from_millis(7));
    }

    #[test]
    fn test_to_json() {
        let metrics = LocalMetrics::new();
        metrics.counter("sent").incr(2);
        let json = metrics.to_json();
        assert_eq!(json["counters"]["sent"], 2);
    }
}
