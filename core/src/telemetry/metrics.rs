use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// Thread-safe per-cycle counters.
pub struct CycleMetrics {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub detections: u64,
    pub misses: u64,
    pub errors: u64,
    pub overruns: u64,
    pub last_latency_us: u64,
    pub max_latency_us: u64,
}

impl CycleMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    /// Counts a completed cycle and its latency.
    pub fn record_cycle(&self, detected: bool, latency: Duration, over_budget: bool) {
        if let Ok(mut metrics) = self.inner.lock() {
            let latency_us = latency.as_micros().min(u64::MAX as u128) as u64;
            metrics.cycles += 1;
            if detected {
                metrics.detections += 1;
            } else {
                metrics.misses += 1;
            }
            if over_budget {
                metrics.overruns += 1;
            }
            metrics.last_latency_us = latency_us;
            metrics.max_latency_us = metrics.max_latency_us.max(latency_us);
        }
    }

    pub fn record_error(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.errors += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|m| *m).unwrap_or_default()
    }
}

impl Default for CycleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_outcomes_and_latency_extremes() {
        let metrics = CycleMetrics::new();
        metrics.record_cycle(true, Duration::from_micros(900), false);
        metrics.record_cycle(false, Duration::from_micros(60_000), true);
        metrics.record_cycle(true, Duration::from_micros(400), false);
        metrics.record_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cycles, 3);
        assert_eq!(snapshot.detections, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.overruns, 1);
        assert_eq!(snapshot.last_latency_us, 400);
        assert_eq!(snapshot.max_latency_us, 60_000);
    }
}
