//! Bridge-wide statistics.
//!
//! Structurally the same "atomics + bounded latency sample buffer" shape as
//! the Router's per-backend `Stats` (`router/registry.rs`), widened to
//! track totals across every request the Bridge has handled, plus a
//! per-backend usage breakdown populated from Router events.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeStatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub streaming_requests: u64,
    pub latency: LatencyPercentiles,
    pub backend_usage: std::collections::HashMap<String, u64>,
    pub error_counts: std::collections::HashMap<String, u64>,
    pub reset_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug)]
pub struct Stats {
    total: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
    streaming: AtomicU64,
    latencies_ms: Mutex<VecDeque<u64>>,
    backend_usage: DashMap<String, AtomicU64>,
    error_counts: DashMap<String, AtomicU64>,
    reset_at: Mutex<chrono::DateTime<chrono::Utc>>,
    sample_cap: usize,
}

impl Stats {
    pub fn new(sample_cap: usize) -> Self {
        Self {
            total: AtomicU64::new(0),
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            streaming: AtomicU64::new(0),
            latencies_ms: Mutex::new(VecDeque::with_capacity(sample_cap)),
            backend_usage: DashMap::new(),
            error_counts: DashMap::new(),
            reset_at: Mutex::new(chrono::Utc::now()),
            sample_cap,
        }
    }

    pub fn record_success(&self, backend: Option<&str>, latency_ms: u64) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.success.fetch_add(1, Ordering::Relaxed);
        self.push_latency(latency_ms);
        if let Some(backend) = backend {
            self.backend_usage
                .entry(backend.to_string())
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self, error_code: &str) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.failure.fetch_add(1, Ordering::Relaxed);
        self.error_counts
            .entry(error_code.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_streaming(&self) {
        self.streaming.fetch_add(1, Ordering::Relaxed);
    }

    fn push_latency(&self, latency_ms: u64) {
        let mut samples = self.latencies_ms.lock().unwrap();
        if samples.len() >= self.sample_cap {
            samples.pop_front();
        }
        samples.push_back(latency_ms);
    }

    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        let samples = self.latencies_ms.lock().unwrap();
        BridgeStatsSnapshot {
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.success.load(Ordering::Relaxed),
            failed_requests: self.failure.load(Ordering::Relaxed),
            streaming_requests: self.streaming.load(Ordering::Relaxed),
            latency: percentiles(&samples),
            backend_usage: self
                .backend_usage
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect(),
            error_counts: self
                .error_counts
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect(),
            reset_at: *self.reset_at.lock().unwrap(),
        }
    }

    /// Zeroes every counter and clears the per-backend/error breakdowns,
    /// stamping a fresh `reset_at`. Idempotent: calling it twice in a row
    /// with no intervening traffic produces the same zeroed snapshot both
    /// times.
    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.success.store(0, Ordering::Relaxed);
        self.failure.store(0, Ordering::Relaxed);
        self.streaming.store(0, Ordering::Relaxed);
        self.latencies_ms.lock().unwrap().clear();
        self.backend_usage.clear();
        self.error_counts.clear();
        *self.reset_at.lock().unwrap() = chrono::Utc::now();
    }
}

fn percentiles(samples: &VecDeque<u64>) -> LatencyPercentiles {
    if samples.is_empty() {
        return LatencyPercentiles::default();
    }
    let mut sorted: Vec<u64> = samples.iter().copied().collect();
    sorted.sort_unstable();
    let at = |p: f64| -> f64 {
        let idx = ((sorted.len() as f64) * p).ceil() as usize;
        let idx = idx.saturating_sub(1).min(sorted.len() - 1);
        sorted[idx] as f64
    };
    LatencyPercentiles {
        p50_ms: at(0.50),
        p95_ms: at(0.95),
        p99_ms: at(0.99),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_zeroes_every_counter() {
        let stats = Stats::new(128);
        stats.record_success(Some("openai"), 10);
        stats.record_failure("invalid_request");
        stats.record_streaming();
        assert_eq!(stats.snapshot().total_requests, 2);

        stats.reset();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.successful_requests, 0);
        assert_eq!(snapshot.failed_requests, 0);
        assert_eq!(snapshot.streaming_requests, 0);
        assert!(snapshot.backend_usage.is_empty());
        assert!(snapshot.error_counts.is_empty());

        // Idempotent: resetting an already-empty Stats is a no-op on the counts.
        stats.reset();
        assert_eq!(stats.snapshot().total_requests, 0);
    }

    #[test]
    fn tracks_p95_latency() {
        let stats = Stats::new(128);
        for ms in 1..=100 {
            stats.record_success(None, ms);
        }
        let snapshot = stats.snapshot();
        assert!(snapshot.latency.p95_ms >= 94.0);
    }
}
