//! Access gate tracking in-flight accessors of a session
//!
//! The gate is a single atomic word. Non-negative values count the accessors
//! currently inside the session; [`CLOSED`] marks a session that has been
//! closed. Closing only succeeds from a count of zero, so a close can never
//! overlap an access, and it never waits: a busy gate is reported to the
//! caller instead.

use std::sync::atomic::{AtomicIsize, Ordering};

/// Gate state of a closed session
pub(crate) const CLOSED: isize = -1;

/// Outcome of an attempt to close the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseAttempt {
    /// Gate flipped to closed; no accessor can enter again
    Closed,
    /// Accessors are still in flight
    Busy(usize),
    /// The gate was already closed
    AlreadyClosed,
}

#[derive(Debug)]
pub(crate) struct AccessGate {
    state: AtomicIsize,
}

impl AccessGate {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicIsize::new(0),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) != CLOSED
    }

    /// Number of accessors currently registered
    pub(crate) fn in_flight(&self) -> usize {
        self.state.load(Ordering::Acquire).max(0) as usize
    }

    /// Register an accessor; false if the gate is closed
    pub(crate) fn enter(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == CLOSED {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => {
                    current = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }

    pub(crate) fn leave(&self) {
        let previous = self.state.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "accessor left a gate it never entered");
    }

    pub(crate) fn try_close(&self) -> CloseAttempt {
        match self
            .state
            .compare_exchange(0, CLOSED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => CloseAttempt::Closed,
            Err(CLOSED) => CloseAttempt::AlreadyClosed,
            Err(count) => CloseAttempt::Busy(count as usize),
        }
    }

    /// Close regardless of the accessor count.
    ///
    /// Only valid when no accessor can exist any more, i.e. while the owning
    /// session is being dropped. Returns whether the gate was still open.
    pub(crate) fn force_close(&self) -> bool {
        self.state.swap(CLOSED, Ordering::AcqRel) != CLOSED
    }
}

/// Registration of an in-flight accessor.
///
/// While a guard exists the session it was acquired from cannot close;
/// `close()` fails with a busy error instead. Dropping the guard releases the
/// registration.
#[must_use = "the session may close as soon as the guard is dropped"]
#[derive(Debug)]
pub struct AccessGuard<'a> {
    gate: Option<&'a AccessGate>,
}

impl<'a> AccessGuard<'a> {
    pub(crate) fn entered(gate: &'a AccessGate) -> Self {
        Self { gate: Some(gate) }
    }

    /// Guard for sessions that never close
    pub(crate) fn unguarded() -> Self {
        Self { gate: None }
    }
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        if let Some(gate) = self.gate {
            gate.leave();
        }
    }
}
