//! Producer side of the event pipeline.
//!
//! The transport's I/O thread owns the [`PipelineSink`] for an adapter and
//! calls it for every unsolicited event, log line and status notification.
//! Nothing here blocks: entries are copied into their ring buffer (or
//! dropped when it is full) and the dispatcher is woken.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::Notify;

use super::entries::{
    timestamp, EventEntry, EventRecord, LogEntry, LogSeverity, StatusCode, StatusEntry,
};
use super::ring_buffer::Producer;
use super::Signals;
use crate::adapter::AdapterId;

/// Entry point for the I/O thread into an adapter's pipeline.
pub struct PipelineSink {
    adapter_id: AdapterId,
    events: Producer<EventEntry>,
    log: Producer<LogEntry>,
    status: Producer<StatusEntry>,
    signals: Arc<Signals>,
}

impl PipelineSink {
    pub(crate) fn new(
        adapter_id: AdapterId,
        events: Producer<EventEntry>,
        log: Producer<LogEntry>,
        status: Producer<StatusEntry>,
        signals: Arc<Signals>,
    ) -> Self {
        Self {
            adapter_id,
            events,
            log,
            status,
            signals,
        }
    }

    #[inline]
    pub fn adapter_id(&self) -> AdapterId {
        self.adapter_id
    }

    /// Whether the pipeline has stopped accepting entries.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.signals.gate.is_closed()
    }

    /// Queue a copy of `event`.
    ///
    /// With a zero batching interval the dispatcher is woken immediately;
    /// otherwise the entry waits for the next tick. Returns `false` if the
    /// entry was dropped because the queue is full or the pipeline is
    /// shutting down.
    pub fn on_event_received(&mut self, event: &[u8]) -> bool {
        let Some(_guard) = self.signals.gate.enter() else {
            tracing::trace!("adapter {} closing, event rejected", self.adapter_id);
            return false;
        };

        let entry = EventEntry {
            event: EventRecord::copy_from(event),
            timestamp: timestamp(),
            adapter_id: self.adapter_id,
        };

        let immediate = self.signals.event_interval_ms.load(Ordering::Acquire) == 0;
        let wake = immediate.then_some(&self.signals.events);
        push(&mut self.events, entry, wake, "event", self.adapter_id)
    }

    /// Queue a log line and wake the dispatcher.
    pub fn on_log_received(&mut self, severity: LogSeverity, message: impl Into<String>) -> bool {
        let Some(_guard) = self.signals.gate.enter() else {
            return false;
        };

        let entry = LogEntry {
            severity,
            message: message.into(),
        };
        push(
            &mut self.log,
            entry,
            Some(&self.signals.log),
            "log",
            self.adapter_id,
        )
    }

    /// Queue a status notification and wake the dispatcher.
    pub fn on_status_received(&mut self, id: StatusCode, message: impl Into<String>) -> bool {
        let Some(_guard) = self.signals.gate.enter() else {
            return false;
        };

        let entry = StatusEntry {
            id,
            message: message.into(),
            timestamp: timestamp(),
        };
        push(
            &mut self.status,
            entry,
            Some(&self.signals.status),
            "status",
            self.adapter_id,
        )
    }
}

/// Push one entry, logging on overflow and waking `wake` on success.
fn push<T>(
    producer: &mut Producer<T>,
    entry: T,
    wake: Option<&Notify>,
    queue: &'static str,
    adapter_id: AdapterId,
) -> bool {
    if !producer.push(entry) {
        tracing::warn!(
            "{} queue full on adapter {}, entry dropped ({} dropped so far)",
            queue,
            adapter_id,
            producer.dropped()
        );
        return false;
    }

    if let Some(notify) = wake {
        notify.notify_one();
    }
    true
}
