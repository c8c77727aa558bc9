//! Backend registry: the router's view of its pool.
//!
//! `DashMap`-backed for lock-free concurrent reads. Registration/
//! unregistration go through `&self` methods that DashMap itself
//! serializes per-key, so the registry never needs a single router-wide
//! lock: DashMap only locks the shard being touched, never the whole
//! table, and never while a provider call is in flight (entries are
//! `Arc`-shared, not held across awaits).

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::circuit_breaker::{CircuitBreaker, CircuitState};
use super::config::RouterConfig;
use crate::backends::BackendAdapter;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendStatsSnapshot {
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendInfo {
    pub name: String,
    pub is_healthy: bool,
    pub last_health_check: Option<chrono::DateTime<chrono::Utc>>,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    pub stats: BackendStatsSnapshot,
    /// Load-balancing hint from configuration, usable by a custom routing
    /// strategy; the built-in strategies don't weight
    /// selection by it themselves.
    pub weight: f64,
}

#[derive(Debug)]
struct Stats {
    success_count: AtomicU64,
    failure_count: AtomicU64,
    latencies_ms: Mutex<VecDeque<u64>>,
}

impl Stats {
    fn new() -> Self {
        Self {
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            latencies_ms: Mutex::new(VecDeque::with_capacity(128)),
        }
    }

    fn record(&self, success: bool, latency_ms: u64) {
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        let mut samples = self.latencies_ms.lock().unwrap();
        if samples.len() >= 128 {
            samples.pop_front();
        }
        samples.push_back(latency_ms);
    }

    fn snapshot(&self) -> BackendStatsSnapshot {
        let samples = self.latencies_ms.lock().unwrap();
        let (avg, p95) = percentiles(&samples);
        BackendStatsSnapshot {
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            avg_latency_ms: avg,
            p95_latency_ms: p95,
        }
    }

    fn p95(&self) -> f64 {
        percentiles(&self.latencies_ms.lock().unwrap()).1
    }
}

fn percentiles(samples: &VecDeque<u64>) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted: Vec<u64> = samples.iter().copied().collect();
    sorted.sort_unstable();
    let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
    let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
    let idx = idx.saturating_sub(1).min(sorted.len() - 1);
    (avg, sorted[idx] as f64)
}

struct Entry {
    adapter: Arc<dyn BackendAdapter>,
    circuit: CircuitBreaker,
    healthy: AtomicBool,
    last_health_check: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
    stats: Stats,
    weight: f64,
}

#[derive(Default)]
pub struct Registry {
    entries: DashMap<String, Arc<Entry>>,
    round_robin: DashMap<String, AtomicU64>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backends", &self.names())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: String, adapter: Arc<dyn BackendAdapter>) {
        self.register_with_weight(name, adapter, 1.0);
    }

    pub fn register_with_weight(&self, name: String, adapter: Arc<dyn BackendAdapter>, weight: f64) {
        self.entries.insert(
            name,
            Arc::new(Entry {
                adapter,
                circuit: CircuitBreaker::new(),
                healthy: AtomicBool::new(true),
                last_health_check: Mutex::new(None),
                stats: Stats::new(),
                weight,
            }),
        );
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Registration order isn't guaranteed by `DashMap` iteration, so
    /// explicit strategies that need it (`explicit`'s "first healthy
    /// backend in registration order") rely on insertion being rare and
    /// the caller supplying an order-sensitive `fallback_chain` instead.
    /// `names()` sorts for determinism in tests and logging.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn adapter(&self, name: &str) -> Option<Arc<dyn BackendAdapter>> {
        self.entries.get(name).map(|e| e.adapter.clone())
    }

    pub fn is_eligible(&self, name: &str, config: &RouterConfig) -> bool {
        match self.entries.get(name) {
            None => false,
            Some(entry) => {
                let healthy = entry.healthy.load(Ordering::Relaxed);
                let circuit_ok = !config.enable_circuit_breaker
                    || entry.circuit.state() != CircuitState::Open;
                healthy && circuit_ok
            }
        }
    }

    pub fn healthy_names(&self, config: &RouterConfig) -> Vec<String> {
        self.names()
            .into_iter()
            .filter(|n| self.is_eligible(n, config))
            .collect()
    }

    pub fn record_success(&self, name: &str, latency_ms: u64) {
        if let Some(entry) = self.entries.get(name) {
            entry.circuit.record_success();
            entry.stats.record(true, latency_ms);
        }
    }

    pub fn record_failure(&self, name: &str, config: &RouterConfig, latency_ms: u64) {
        if let Some(entry) = self.entries.get(name) {
            if config.enable_circuit_breaker {
                entry
                    .circuit
                    .record_failure(config.circuit_breaker_threshold, config.circuit_breaker_timeout);
            }
            entry.stats.record(false, latency_ms);
        }
    }

    pub fn set_health(&self, name: &str, healthy: bool) {
        if let Some(entry) = self.entries.get(name) {
            entry.healthy.store(healthy, Ordering::Relaxed);
            *entry.last_health_check.lock().unwrap() = Some(chrono::Utc::now());
        }
    }

    pub fn open_circuit(&self, name: &str, timeout: Duration) {
        if let Some(entry) = self.entries.get(name) {
            entry.circuit.force_open(timeout);
        }
    }

    pub fn close_circuit(&self, name: &str) {
        if let Some(entry) = self.entries.get(name) {
            entry.circuit.force_close();
        }
    }

    pub fn reset_circuit(&self, name: &str) {
        if let Some(entry) = self.entries.get(name) {
            entry.circuit.reset();
        }
    }

    pub fn p95_latency_ms(&self, name: &str) -> f64 {
        self.entries.get(name).map(|e| e.stats.p95()).unwrap_or(f64::MAX)
    }

    pub fn info(&self, name: &str, _config: &RouterConfig) -> Option<BackendInfo> {
        let entry = self.entries.get(name)?;
        Some(BackendInfo {
            name: name.to_string(),
            is_healthy: entry.healthy.load(Ordering::Relaxed),
            last_health_check: *entry.last_health_check.lock().unwrap(),
            circuit_state: entry.circuit.state(),
            consecutive_failures: entry.circuit.consecutive_failures(),
            stats: entry.stats.snapshot(),
            weight: entry.weight,
        })
    }

    /// Atomically advances and returns the next round-robin index for a
    /// given key (e.g. `"__global__"` or a model name), per
    /// [`super::RoutingStrategy::RoundRobin`].
    pub fn next_round_robin(&self, key: &str) -> u64 {
        self.round_robin
            .entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::SeqCst)
    }
}
