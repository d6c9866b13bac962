//! Pipeline module - event, log and status delivery.
//!
//! ```text
//! I/O thread ─► PipelineSink ─► ring buffers ─► Dispatcher ─► callbacks
//!                   │                               ▲
//!                   └──────── Notify wake ──────────┘
//! ```
//!
//! Each of the three streams has its own SPSC ring buffer and callback.
//! A dispatch drains everything currently queued in one stream and hands it
//! to the callback as a single batch; an empty queue never produces a call.
//! Events may be batched on a timer; log and status entries are always
//! dispatched as soon as they arrive.

mod dispatcher;
mod entries;
mod gate;
mod ring_buffer;
mod sink;
mod stats;

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

pub use dispatcher::Dispatcher;
pub use entries::{
    timestamp, EventEntry, EventRecord, LogEntry, LogSeverity, StatusCode, StatusEntry,
};
pub use gate::{GateGuard, ShutdownGate};
pub use ring_buffer::{ring_buffer, Consumer, Producer};
pub use sink::PipelineSink;
pub use stats::PipelineStats;

use crate::adapter::AdapterId;
use crate::config::PipelineConfig;
use stats::EventStats;

/// Callback receiving one batch of entries.
pub type BatchCallback<T> = Box<dyn FnMut(Vec<T>) + Send>;
pub type EventCallback = BatchCallback<EventEntry>;
pub type LogCallback = BatchCallback<LogEntry>;
pub type StatusCallback = BatchCallback<StatusEntry>;

thread_local! {
    /// Streams whose callback is running on this thread, innermost last.
    static ACTIVE_STREAMS: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// State shared between the sink, the pipeline and the dispatcher.
pub(crate) struct Signals {
    pub(crate) events: Notify,
    pub(crate) log: Notify,
    pub(crate) status: Notify,
    pub(crate) event_interval_ms: AtomicU64,
    pub(crate) gate: ShutdownGate,
}

impl Signals {
    fn new(event_interval: Duration) -> Self {
        Self {
            events: Notify::new(),
            log: Notify::new(),
            status: Notify::new(),
            event_interval_ms: AtomicU64::new(duration_to_millis(event_interval)),
            gate: ShutdownGate::new(),
        }
    }

    fn wake_all(&self) {
        self.events.notify_one();
        self.log.notify_one();
        self.status.notify_one();
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a stream's callback as running on this thread until dropped.
struct CallbackScope;

impl CallbackScope {
    fn enter(stream: usize) -> Self {
        ACTIVE_STREAMS.with(|active| active.borrow_mut().push(stream));
        CallbackScope
    }

    fn is_active(stream: usize) -> bool {
        ACTIVE_STREAMS.with(|active| active.borrow().contains(&stream))
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        ACTIVE_STREAMS.with(|active| {
            active.borrow_mut().pop();
        });
    }
}

/// One queue plus its callback.
struct Stream<T> {
    /// Serializes dispatches so batches reach the callback in queue order.
    dispatch: Mutex<()>,
    consumer: Mutex<Consumer<T>>,
    callback: Mutex<Option<BatchCallback<T>>>,
}

impl<T> Stream<T> {
    fn new(consumer: Consumer<T>) -> Self {
        Self {
            dispatch: Mutex::new(()),
            consumer: Mutex::new(consumer),
            callback: Mutex::new(None),
        }
    }

    fn set_callback(&self, callback: BatchCallback<T>) {
        *lock(&self.callback) = Some(callback);
    }

    fn dropped(&self) -> u64 {
        lock(&self.consumer).dropped()
    }

    fn is_empty(&self) -> bool {
        lock(&self.consumer).is_empty()
    }

    /// Drain the queue and invoke the callback once with the batch.
    ///
    /// Returns the batch size and the time spent in the callback, or `None`
    /// if nothing was delivered. Entries stay queued while no callback is
    /// registered, and while this stream's own callback is running on the
    /// current thread.
    fn dispatch(&self) -> Option<(usize, Duration)> {
        let id = self as *const Self as usize;
        if CallbackScope::is_active(id) {
            return None;
        }

        let _serial = lock(&self.dispatch);

        let mut callback = lock(&self.callback).take()?;

        let mut batch = Vec::new();
        lock(&self.consumer).drain_into(&mut batch);

        if batch.is_empty() {
            restore_callback(&self.callback, callback);
            return None;
        }

        let batch_len = batch.len();
        let started = Instant::now();
        {
            let _scope = CallbackScope::enter(id);
            callback(batch);
        }
        let elapsed = started.elapsed();

        restore_callback(&self.callback, callback);
        Some((batch_len, elapsed))
    }
}

/// Put `callback` back unless a new one was registered while it ran.
fn restore_callback<T>(slot: &Mutex<Option<BatchCallback<T>>>, callback: BatchCallback<T>) {
    let mut slot = lock(slot);
    if slot.is_none() {
        *slot = Some(callback);
    }
}

/// Consumer side of an adapter's event pipeline.
pub struct EventPipeline {
    adapter_id: AdapterId,
    events: Stream<EventEntry>,
    log: Stream<LogEntry>,
    status: Stream<StatusEntry>,
    signals: Arc<Signals>,
    event_stats: EventStats,
    log_dispatched: AtomicU64,
    status_dispatched: AtomicU64,
    /// Callbacks run only while armed.
    armed: AtomicBool,
}

impl EventPipeline {
    /// Create a pipeline and the sink that feeds it.
    pub fn new(adapter_id: AdapterId, config: &PipelineConfig) -> (Self, PipelineSink) {
        let (event_tx, event_rx) = ring_buffer(config.queue_capacity);
        let (log_tx, log_rx) = ring_buffer(config.queue_capacity);
        let (status_tx, status_rx) = ring_buffer(config.queue_capacity);

        let signals = Arc::new(Signals::new(config.event_interval()));

        let pipeline = Self {
            adapter_id,
            events: Stream::new(event_rx),
            log: Stream::new(log_rx),
            status: Stream::new(status_rx),
            signals: signals.clone(),
            event_stats: EventStats::default(),
            log_dispatched: AtomicU64::new(0),
            status_dispatched: AtomicU64::new(0),
            armed: AtomicBool::new(false),
        };

        let sink = PipelineSink::new(adapter_id, event_tx, log_tx, status_tx, signals);
        (pipeline, sink)
    }

    #[inline]
    pub fn adapter_id(&self) -> AdapterId {
        self.adapter_id
    }

    /// Register the event callback and its batching interval.
    ///
    /// `Duration::ZERO` dispatches each event as soon as it is queued.
    pub fn set_event_callback<F>(&self, interval: Duration, callback: F)
    where
        F: FnMut(Vec<EventEntry>) + Send + 'static,
    {
        self.events.set_callback(Box::new(callback));
        self.set_event_interval(interval);
    }

    pub fn set_log_callback<F>(&self, callback: F)
    where
        F: FnMut(Vec<LogEntry>) + Send + 'static,
    {
        self.log.set_callback(Box::new(callback));
        self.signals.log.notify_one();
    }

    pub fn set_status_callback<F>(&self, callback: F)
    where
        F: FnMut(Vec<StatusEntry>) + Send + 'static,
    {
        self.status.set_callback(Box::new(callback));
        self.signals.status.notify_one();
    }

    pub(crate) fn set_boxed_callbacks(
        &self,
        events: Option<EventCallback>,
        log: Option<LogCallback>,
        status: Option<StatusCallback>,
    ) {
        if let Some(callback) = events {
            self.events.set_callback(callback);
        }
        if let Some(callback) = log {
            self.log.set_callback(callback);
        }
        if let Some(callback) = status {
            self.status.set_callback(callback);
        }
    }

    /// Change the event batching interval.
    ///
    /// The dispatcher picks the new value up on its next wake.
    pub fn set_event_interval(&self, interval: Duration) {
        self.signals
            .event_interval_ms
            .store(duration_to_millis(interval), Ordering::Release);
        self.signals.events.notify_one();
    }

    pub fn event_interval(&self) -> Duration {
        Duration::from_millis(self.signals.event_interval_ms.load(Ordering::Acquire))
    }

    /// Deliver all queued events to the event callback as one batch.
    ///
    /// Returns the number of events delivered; 0 means the callback was not
    /// called.
    pub fn dispatch_events(&self) -> usize {
        self.dispatch_stream(&self.events, |batch_len, elapsed| {
            self.event_stats.record_batch(batch_len, elapsed);
        })
    }

    /// Deliver all queued log entries to the log callback.
    pub fn dispatch_log(&self) -> usize {
        self.dispatch_stream(&self.log, |batch_len, _| {
            self.log_dispatched
                .fetch_add(batch_len as u64, Ordering::Relaxed);
        })
    }

    /// Deliver all queued status entries to the status callback.
    pub fn dispatch_status(&self) -> usize {
        self.dispatch_stream(&self.status, |batch_len, _| {
            self.status_dispatched
                .fetch_add(batch_len as u64, Ordering::Relaxed);
        })
    }

    /// Dispatch one stream, reporting each delivered batch to `on_batch`.
    ///
    /// If the pipeline was shut down while the callback ran, for instance
    /// by the callback itself, the stream is drained again: the final flush
    /// skips a stream whose callback is on the stack, so whatever the
    /// callback queued before closing is delivered here.
    fn dispatch_stream<T>(
        &self,
        stream: &Stream<T>,
        mut on_batch: impl FnMut(usize, Duration),
    ) -> usize {
        if !self.is_armed() {
            return 0;
        }

        let mut delivered = 0;
        while let Some((batch_len, elapsed)) = stream.dispatch() {
            on_batch(batch_len, elapsed);
            delivered += batch_len;
            if !self.is_closed() {
                break;
            }
        }
        delivered
    }

    /// Dispatch all three streams.
    pub fn flush(&self) {
        self.dispatch_events();
        self.dispatch_log();
        self.dispatch_status();
    }

    /// Hint only; the I/O thread may push concurrently.
    pub fn has_pending(&self) -> bool {
        !(self.events.is_empty() && self.log.is_empty() && self.status.is_empty())
    }

    /// Allow callbacks to run and deliver anything queued in the meantime.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
        self.signals.wake_all();
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Whether the sink has stopped accepting entries.
    pub fn is_closed(&self) -> bool {
        self.signals.gate.is_closed()
    }

    /// Stop the pipeline.
    ///
    /// Closes the sink first, so every entry is either rejected or already
    /// queued, then stops the dispatcher, delivers what is left and disarms.
    pub fn shutdown(&self, dispatcher: Option<Dispatcher>) {
        self.signals.gate.close();

        if let Some(mut dispatcher) = dispatcher {
            dispatcher.stop();
        }

        self.flush();
        self.disarm();
        tracing::debug!("pipeline for adapter {} shut down", self.adapter_id);
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            events_dispatched: self.event_stats.events(),
            event_batches: self.event_stats.batches(),
            max_event_batch: self.event_stats.max_batch(),
            event_callback_micros: u64::try_from(self.event_stats.callback_time().as_micros())
                .unwrap_or(u64::MAX),
            log_entries_dispatched: self.log_dispatched.load(Ordering::Relaxed),
            status_entries_dispatched: self.status_dispatched.load(Ordering::Relaxed),
            dropped_events: self.events.dropped(),
            dropped_log_entries: self.log.dropped(),
            dropped_status_entries: self.status.dropped(),
        }
    }

    pub(crate) fn signals(&self) -> &Arc<Signals> {
        &self.signals
    }
}
