//! Dispatch statistics.
//!
//! Counters are written only by the dispatching side and read by anyone,
//! so they are plain atomics without any cross-counter consistency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Running counters for event batches.
#[derive(Debug, Default)]
pub(crate) struct EventStats {
    events: AtomicU64,
    batches: AtomicU64,
    max_batch: AtomicU64,
    callback_nanos: AtomicU64,
}

impl EventStats {
    /// Record one delivered batch and the time its callback took.
    pub(crate) fn record_batch(&self, batch_len: usize, elapsed: Duration) {
        let batch_len = batch_len as u64;
        self.events.fetch_add(batch_len, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.max_batch.fetch_max(batch_len, Ordering::Relaxed);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.callback_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub(crate) fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    pub(crate) fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub(crate) fn max_batch(&self) -> u64 {
        self.max_batch.load(Ordering::Relaxed)
    }

    pub(crate) fn callback_time(&self) -> Duration {
        Duration::from_nanos(self.callback_nanos.load(Ordering::Relaxed))
    }
}

/// Point-in-time view of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Events handed to the event callback.
    pub events_dispatched: u64,
    /// Event callback invocations.
    pub event_batches: u64,
    /// Largest batch delivered in one callback.
    pub max_event_batch: u64,
    /// Total time spent inside the event callback, in microseconds.
    pub event_callback_micros: u64,
    pub log_entries_dispatched: u64,
    pub status_entries_dispatched: u64,
    /// Entries rejected because their queue was full.
    pub dropped_events: u64,
    pub dropped_log_entries: u64,
    pub dropped_status_entries: u64,
}

impl PipelineStats {
    /// Mean number of events per callback, or 0 before the first batch.
    pub fn average_event_batch(&self) -> f64 {
        if self.event_batches == 0 {
            0.0
        } else {
            self.events_dispatched as f64 / self.event_batches as f64
        }
    }

    pub fn event_callback_time(&self) -> Duration {
        Duration::from_micros(self.event_callback_micros)
    }
}
