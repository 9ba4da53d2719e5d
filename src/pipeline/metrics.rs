// src/pipeline/metrics.rs
//
// Counters shared between the capture threads and the evaluation loop.
// Cloning shares the same counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub ticks: Arc<AtomicU64>,
    pub idle_ticks: Arc<AtomicU64>,
    pub frames_acquired: Arc<AtomicU64>,
    pub acquisition_failures: Arc<AtomicU64>,
    pub extractions: Arc<AtomicU64>,
    pub extraction_failures: Arc<AtomicU64>,
    pub transitions: Arc<AtomicU64>,
    pub transition_failures: Arc<AtomicU64>,
    pub cooldown_skips: Arc<AtomicU64>,
    pub last_tick_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(0)),
            idle_ticks: Arc::new(AtomicU64::new(0)),
            frames_acquired: Arc::new(AtomicU64::new(0)),
            acquisition_failures: Arc::new(AtomicU64::new(0)),
            extractions: Arc::new(AtomicU64::new(0)),
            extraction_failures: Arc::new(AtomicU64::new(0)),
            transitions: Arc::new(AtomicU64::new(0)),
            transition_failures: Arc::new(AtomicU64::new(0)),
            cooldown_skips: Arc::new(AtomicU64::new(0)),
            last_tick_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn tick_rate(&self) -> f64 {
        let ticks = self.ticks.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            ticks as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            ticks: self.ticks.load(Ordering::Relaxed),
            idle_ticks: self.idle_ticks.load(Ordering::Relaxed),
            tick_rate: self.tick_rate(),
            frames_acquired: self.frames_acquired.load(Ordering::Relaxed),
            acquisition_failures: self.acquisition_failures.load(Ordering::Relaxed),
            extractions: self.extractions.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            transition_failures: self.transition_failures.load(Ordering::Relaxed),
            cooldown_skips: self.cooldown_skips.load(Ordering::Relaxed),
            last_tick_us: self.last_tick_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub ticks: u64,
    pub idle_ticks: u64,
    pub tick_rate: f64,
    pub frames_acquired: u64,
    pub acquisition_failures: u64,
    pub extractions: u64,
    pub extraction_failures: u64,
    pub transitions: u64,
    pub transition_failures: u64,
    pub cooldown_skips: u64,
    pub last_tick_us: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = PipelineMetrics::new();
        let clone = metrics.clone();

        clone.inc(&clone.transitions);
        metrics.inc(&metrics.transitions);

        assert_eq!(metrics.summary().transitions, 2);
        let json = serde_json::to_value(metrics.summary()).unwrap();
        assert_eq!(json["transitions"], 2);
    }
}
