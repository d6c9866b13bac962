//! Shutdown gate for the producer side of the pipeline.
//!
//! Every push enters the gate before touching a ring buffer and leaves it
//! afterwards. Closing the gate stops new entries and waits for the ones
//! already inside, so once [`ShutdownGate::close`] returns, every push has
//! either landed in its ring buffer (and will be seen by the final drain)
//! or been rejected.
//!
//! Both counters use sequentially consistent operations: a producer that
//! increments `inflight` after the closer has read zero is ordered after the
//! closer's store to `closed` and therefore sees it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

#[derive(Debug, Default)]
pub struct ShutdownGate {
    /// Producers currently inside the gate.
    inflight: AtomicUsize,
    closed: AtomicBool,
}

impl ShutdownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the gate, or `None` once it has been closed.
    pub fn enter(&self) -> Option<GateGuard<'_>> {
        self.inflight.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(GateGuard { gate: self })
    }

    /// Refuse new entries and wait until the gate is empty.
    ///
    /// Idempotent. Must not be called by a thread that holds a guard.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        while self.inflight.load(Ordering::SeqCst) != 0 {
            thread::yield_now();
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Producers currently inside.
    #[inline]
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }
}

/// Leaves the gate on drop.
#[must_use = "the gate is left as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    gate: &'a ShutdownGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}
