//! Router-originated events, forwarded by the Bridge to its own listeners.

#[derive(Debug, Clone)]
pub enum RouterEvent {
    Selected { name: String },
    Failover {
        previous: String,
        current: String,
        reason: String,
    },
    Health { name: String, healthy: bool },
}
