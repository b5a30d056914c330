//! Session statistics tracking

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Snapshot of the bookkeeping of one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Native allocations made through the session
    pub allocations: u64,
    /// Bytes requested by those allocations
    pub allocated_bytes: usize,
    /// Close actions registered so far
    pub close_actions: u64,
    /// Accessors in flight when the snapshot was taken
    pub in_flight: usize,
    /// Close attempts refused because accessors were in flight
    pub busy_closes: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Default::default()
    }

    /// Get a summary string of the statistics
    pub fn summary(&self) -> String {
        format!(
            "SessionStats {{ allocations: {}, bytes: {}, \
             close_actions: {}, in_flight: {}, busy_closes: {} }}",
            self.allocations,
            self.allocated_bytes,
            self.close_actions,
            self.in_flight,
            self.busy_closes
        )
    }
}

/// Thread-safe counters behind [`SessionStats`]
#[derive(Debug, Default)]
pub(crate) struct AtomicSessionStats {
    allocations: AtomicU64,
    allocated_bytes: AtomicUsize,
    close_actions: AtomicU64,
    busy_closes: AtomicU64,
}

impl AtomicSessionStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_allocation(&self, bytes: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.allocated_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_close_action(&self) {
        self.close_actions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_busy_close(&self) {
        self.busy_closes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, in_flight: usize) -> SessionStats {
        SessionStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            allocated_bytes: self.allocated_bytes.load(Ordering::Relaxed),
            close_actions: self.close_actions.load(Ordering::Relaxed),
            in_flight,
            busy_closes: self.busy_closes.load(Ordering::Relaxed),
        }
    }
}

/// Source of session identifiers
pub(crate) fn next_session_id() -> u64 {
    static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);
    SESSION_COUNTER.fetch_add(1, Ordering::Relaxed)
}
