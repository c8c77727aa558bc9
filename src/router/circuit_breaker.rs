//! Per-backend circuit breaker.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Tracks consecutive failures and the open/half-open/closed state
/// transition for one backend. `opened_at` is stored as millis-since-
/// process-start in an `AtomicU64` rather than `Instant` directly so the
/// whole breaker can live behind `&self` without a lock on the hot failure
/// path.
#[derive(Debug)]
pub struct CircuitBreaker {
    start: Instant,
    consecutive_failures: AtomicU32,
    state: std::sync::Mutex<CircuitState>,
    opened_at_ms: AtomicU64,
    timeout_ms: AtomicU64,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            consecutive_failures: AtomicU32::new(0),
            state: std::sync::Mutex::new(CircuitState::Closed),
            opened_at_ms: AtomicU64::new(0),
            timeout_ms: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Current state, first rolling `Open -> HalfOpen` if `timeout` has
    /// elapsed since it opened (testable property 6: "after `timeout`, the
    /// next selection MAY choose it (half-open)").
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock().unwrap();
        if *state == CircuitState::Open {
            let opened_at = self.opened_at_ms.load(Ordering::SeqCst);
            let timeout = self.timeout_ms.load(Ordering::SeqCst);
            if self.now_ms().saturating_sub(opened_at) >= timeout {
                *state = CircuitState::HalfOpen;
            }
        }
        *state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Records a success: resets the failure counter, and restores `Closed`
    /// from `HalfOpen` (testable property 6).
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        *state = CircuitState::Closed;
    }

    /// Records a failure: increments the counter, and opens the breaker
    /// either after `threshold` consecutive failures from `Closed`, or
    /// immediately on any failure while `HalfOpen`.
    pub fn record_failure(&self, threshold: u32, timeout: Duration) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().unwrap();
        let should_open = match *state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => failures >= threshold,
            CircuitState::Open => false,
        };
        if should_open {
            *state = CircuitState::Open;
            self.opened_at_ms.store(self.now_ms(), Ordering::SeqCst);
            self.timeout_ms
                .store(timeout.as_millis() as u64, Ordering::SeqCst);
        }
    }

    pub fn force_open(&self, timeout: Duration) {
        *self.state.lock().unwrap() = CircuitState::Open;
        self.opened_at_ms.store(self.now_ms(), Ordering::SeqCst);
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn force_close(&self) {
        *self.state.lock().unwrap() = CircuitState::Closed;
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.force_close();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreaker::new();
        for _ in 0..4 {
            cb.record_failure(5, Duration::from_millis(50));
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        cb.record_failure(5, Duration::from_millis(50));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn half_opens_after_timeout_then_closes_on_success() {
        let cb = CircuitBreaker::new();
        for _ in 0..2 {
            cb.record_failure(2, Duration::from_millis(30));
        }
        assert_eq!(cb.state(), CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let cb = CircuitBreaker::new();
        cb.record_failure(1, Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure(1, Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
