//! Cooperative cancellation token.
//!
//! Shared by the Bridge and Router, not just the HTTP edge, so a client
//! disconnect or an explicit cancel request stops in-flight provider work at
//! whichever layer is holding it. A `Cancellation` is cheap to clone (an
//! `Arc` inside) and cheap to check (`Ordering::Relaxed` load) on every pull
//! of a stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Signals cancellation to every clone of this token. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Resolves once `cancel()` is called (or immediately, if already
    /// cancelled). Intended to be raced against a provider I/O future with
    /// `tokio::select!` so a stream producer can release its reader on
    /// cancellation instead of only checking between pulls.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// A scoped guard that cancels on drop unless [`CancellationGuard::disarm`]
    /// is called, used by the Router's parallel dispatch to cancel sibling
    /// attempts once one succeeds.
    pub fn guard(&self) -> CancellationGuard {
        CancellationGuard {
            token: self.clone(),
            armed: true,
        }
    }
}

pub struct CancellationGuard {
    token: Cancellation,
    armed: bool,
}

impl CancellationGuard {
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        if self.armed {
            self.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let token = Cancellation::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        assert!(!token.is_cancelled());
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn guard_cancels_on_drop_unless_disarmed() {
        let token = Cancellation::new();
        {
            let _guard = token.guard();
        }
        assert!(token.is_cancelled());

        let token2 = Cancellation::new();
        {
            let guard = token2.guard();
            guard.disarm();
        }
        assert!(!token2.is_cancelled());
    }
}
