// src/pipeline/metrics.rs
//
// Counters for the counting pipeline and its delivery worker. Cloned
// handles share the same atomics, so the push worker can report into the
// same bundle the ingestion loop writes to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub malformed_lines: Arc<AtomicU64>,
    pub observations: Arc<AtomicU64>,
    pub dropped_detections: Arc<AtomicU64>,
    pub enter_events: Arc<AtomicU64>,
    pub exit_events: Arc<AtomicU64>,
    pub tracks_evicted: Arc<AtomicU64>,
    pub push_successes: Arc<AtomicU64>,
    pub push_failures: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            malformed_lines: Arc::new(AtomicU64::new(0)),
            observations: Arc::new(AtomicU64::new(0)),
            dropped_detections: Arc::new(AtomicU64::new(0)),
            enter_events: Arc::new(AtomicU64::new(0)),
            exit_events: Arc::new(AtomicU64::new(0)),
            tracks_evicted: Arc::new(AtomicU64::new(0)),
            push_successes: Arc::new(AtomicU64::new(0)),
            push_failures: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            malformed_lines: self.malformed_lines.load(Ordering::Relaxed),
            observations: self.observations.load(Ordering::Relaxed),
            dropped_detections: self.dropped_detections.load(Ordering::Relaxed),
            enter_events: self.enter_events.load(Ordering::Relaxed),
            exit_events: self.exit_events.load(Ordering::Relaxed),
            tracks_evicted: self.tracks_evicted.load(Ordering::Relaxed),
            push_successes: self.push_successes.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub malformed_lines: u64,
    pub observations: u64,
    pub dropped_detections: u64,
    pub enter_events: u64,
    pub exit_events: u64,
    pub tracks_evicted: u64,
    pub push_successes: u64,
    pub push_failures: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = PipelineMetrics::new();
        let worker_view = metrics.clone();

        metrics.inc(&metrics.enter_events);
        worker_view.inc(&worker_view.push_failures);
        worker_view.add(&worker_view.tracks_evicted, 4);

        let summary = metrics.summary();
        assert_eq!(summary.enter_events, 1);
        assert_eq!(summary.push_failures, 1);
        assert_eq!(summary.tracks_evicted, 4);
    }
}
