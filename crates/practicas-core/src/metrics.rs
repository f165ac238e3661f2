//! Global atomic counters for the practicas core.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a batch or a CLI run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations, no locking.
pub struct Metrics {
    transitions_applied: AtomicU64,
    conflicts: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
    audit_write_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            transitions_applied: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            audit_write_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_transitions(&self) {
        self.transitions_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "transitions_applied", "counter incremented");
    }

    pub fn inc_conflicts(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "conflicts", "counter incremented");
    }

    pub fn inc_notification(&self, success: bool) {
        if success {
            self.notifications_sent.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(metric = "notifications_sent", "counter incremented");
        } else {
            self.notifications_failed.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(metric = "notifications_failed", "counter incremented");
        }
    }

    pub fn inc_audit_write_failures(&self) {
        self.audit_write_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "audit_write_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            transitions_applied = self.transitions_applied(),
            conflicts = self.conflicts(),
            notifications_sent = self.notifications_sent(),
            notifications_failed = self.notifications_failed(),
            audit_write_failures = self.audit_write_failures(),
        );
    }

    pub fn transitions_applied(&self) -> u64 {
        self.transitions_applied.load(Ordering::Relaxed)
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }

    pub fn notifications_failed(&self) -> u64 {
        self.notifications_failed.load(Ordering::Relaxed)
    }

    pub fn audit_write_failures(&self) -> u64 {
        self.audit_write_failures.load(Ordering::Relaxed)
    }
}
