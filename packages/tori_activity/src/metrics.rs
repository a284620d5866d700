//! Activity metrics
//!
//! Counters for what happened on the delivery path. Dropped messages are
//! expected here (echoes, dead sessions, failing listeners), so these counters
//! are the only place they become visible.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ActivityMetrics {
    /// Messages published by `send_*`
    pub messages_sent: AtomicU64,
    /// Listener callbacks that completed successfully
    pub deliveries: AtomicU64,
    /// Deliveries dropped because the listener's own session sent them
    pub echoes_suppressed: AtomicU64,
    /// Listeners removed after their session was found dead
    pub listeners_reaped: AtomicU64,
    /// Listener callbacks that returned an error or panicked
    pub callback_failures: AtomicU64,
    /// Liveness probes that errored instead of answering
    pub probe_failures: AtomicU64,
    pub listeners_added: AtomicU64,
    pub listeners_removed: AtomicU64,
}

impl ActivityMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn echo_suppressed(&self) {
        self.echoes_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn listener_reaped(&self) {
        self.listeners_reaped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn callback_failed(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn probe_failed(&self) {
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn listener_added(&self) {
        self.listeners_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn listener_removed(&self) {
        self.listeners_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            echoes_suppressed: self.echoes_suppressed.load(Ordering::Relaxed),
            listeners_reaped: self.listeners_reaped.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            listeners_added: self.listeners_added.load(Ordering::Relaxed),
            listeners_removed: self.listeners_removed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub deliveries: u64,
    pub echoes_suppressed: u64,
    pub listeners_reaped: u64,
    pub callback_failures: u64,
    pub probe_failures: u64,
    pub listeners_added: u64,
    pub listeners_removed: u64,
}
