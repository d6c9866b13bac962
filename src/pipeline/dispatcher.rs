//! Dedicated dispatch thread.
//!
//! Callbacks never run on the transport's I/O thread. Each adapter gets one
//! thread running a current-thread tokio runtime that waits for wakes from
//! the sink, the event batching timer or shutdown.
//!
//! ```text
//! PipelineSink ─► Notify (events | log | status) ─┐
//! Interval tick ──────────────────────────────────┼─► dispatch_loop ─► callbacks
//! stop() ─► oneshot ──────────────────────────────┘
//! ```

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use super::EventPipeline;

/// Handle to a running dispatch thread.
#[derive(Debug)]
pub struct Dispatcher {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start dispatching `pipeline` on a new thread named `thread_name`.
    pub fn spawn(pipeline: Arc<EventPipeline>, thread_name: &str) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let thread = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                runtime.block_on(dispatch_loop(pipeline, shutdown_rx));
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Signal the thread to exit and wait for it.
    ///
    /// Safe to call more than once. When called from a callback running on
    /// the dispatch thread itself the thread is signalled but not joined.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            tracing::debug!("dispatcher stopped from its own thread, not joining");
            return;
        }
        if thread.join().is_err() {
            tracing::error!("dispatch thread panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn dispatch_loop(pipeline: Arc<EventPipeline>, mut shutdown: oneshot::Receiver<()>) {
    let signals = pipeline.signals().clone();
    let mut interval_ms = signals.event_interval_ms.load(Ordering::Acquire);
    let mut ticker = event_ticker(interval_ms);

    tracing::debug!(
        "dispatcher for adapter {} started (event interval {}ms)",
        pipeline.adapter_id(),
        interval_ms
    );

    loop {
        let current = signals.event_interval_ms.load(Ordering::Acquire);
        if current != interval_ms {
            interval_ms = current;
            ticker = event_ticker(interval_ms);
        }

        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            _ = signals.events.notified() => {
                // Also woken by interval changes; with batching enabled the
                // queue is drained by the timer instead.
                if signals.event_interval_ms.load(Ordering::Acquire) == 0 {
                    pipeline.dispatch_events();
                }
            }

            _ = signals.log.notified() => {
                pipeline.dispatch_log();
            }

            _ = signals.status.notified() => {
                pipeline.dispatch_status();
            }

            _ = tick(&mut ticker) => {
                pipeline.dispatch_events();
            }
        }
    }

    tracing::debug!("dispatcher for adapter {} exiting", pipeline.adapter_id());
}

fn event_ticker(interval_ms: u64) -> Option<Interval> {
    if interval_ms == 0 {
        return None;
    }
    let period = Duration::from_millis(interval_ms);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterId;
    use crate::config::PipelineConfig;
    use crate::pipeline::{LogSeverity, StatusCode};
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(2);

    fn running_pipeline(
        interval_ms: u64,
    ) -> (Arc<EventPipeline>, crate::pipeline::PipelineSink, Dispatcher) {
        let config = PipelineConfig {
            event_interval_ms: interval_ms,
            ..Default::default()
        };
        let (pipeline, sink) = EventPipeline::new(AdapterId::new(7), &config);
        let pipeline = Arc::new(pipeline);
        let dispatcher = Dispatcher::spawn(pipeline.clone(), "test-dispatch").unwrap();
        pipeline.arm();
        (pipeline, sink, dispatcher)
    }

    #[test]
    fn test_immediate_dispatch() {
        let (pipeline, mut sink, mut dispatcher) = running_pipeline(0);
        let (tx, rx) = mpsc::channel();
        pipeline.set_event_callback(Duration::ZERO, move |batch| {
            for entry in batch {
                tx.send(entry.event.into_bytes()).unwrap();
            }
        });

        sink.on_event_received(b"one");
        sink.on_event_received(b"two");

        assert_eq!(rx.recv_timeout(WAIT).unwrap().as_ref(), b"one");
        assert_eq!(rx.recv_timeout(WAIT).unwrap().as_ref(), b"two");
        dispatcher.stop();
    }

    #[test]
    fn test_interval_batches_events() {
        let (pipeline, mut sink, mut dispatcher) = running_pipeline(100);
        let (tx, rx) = mpsc::channel();
        pipeline.set_event_callback(Duration::from_millis(100), move |batch| {
            tx.send(batch.len()).unwrap();
        });

        for i in 0..5u8 {
            assert!(sink.on_event_received(&[i]));
        }

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 5);
        // No more events: the timer keeps ticking without calling back.
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        dispatcher.stop();
    }

    #[test]
    fn test_log_and_status_dispatch_immediately_with_interval() {
        let (pipeline, mut sink, mut dispatcher) = running_pipeline(10_000);
        let (tx, rx) = mpsc::channel();
        let status_tx = tx.clone();
        pipeline.set_log_callback(move |batch| {
            tx.send(format!("log:{}", batch[0].message)).unwrap();
        });
        pipeline.set_status_callback(move |batch| {
            status_tx.send(format!("status:{}", batch[0].id)).unwrap();
        });

        sink.on_log_received(LogSeverity::Debug, "hello");
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "log:hello");

        sink.on_status_received(StatusCode::ConnectionActive, "up");
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "status:CONNECTION_ACTIVE");
        dispatcher.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (_pipeline, _sink, mut dispatcher) = running_pipeline(0);
        assert!(dispatcher.is_running());
        dispatcher.stop();
        dispatcher.stop();
        assert!(!dispatcher.is_running());
    }
}
