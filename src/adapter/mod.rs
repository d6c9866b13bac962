//! Adapter module - one open connection to a SoftDevice.
//!
//! An [`Adapter`] ties together the three parts of the driver for one
//! device: the transport, the [`RpcBridge`] that runs commands over it and
//! the [`EventPipeline`] that delivers what the device sends unprompted.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sd_rpc_host::{AdapterBuilder, NRF_SUCCESS};
//! use sd_rpc_host::transport::LoopbackTransport;
//!
//! let (transport, _device) = LoopbackTransport::new(|_request, response| {
//!     response[0] = 0;
//!     Ok(1)
//! });
//!
//! let adapter = AdapterBuilder::new()
//!     .event_interval(Duration::from_millis(10))
//!     .on_events(|batch| println!("{} events", batch.len()))
//!     .open(transport)
//!     .unwrap();
//!
//! let code = adapter.command(
//!     |buf| { buf[0] = 0x60; Ok(1) },
//!     |response| Ok(u32::from(response[0])),
//! );
//! assert_eq!(code, NRF_SUCCESS);
//! adapter.close().unwrap();
//! ```

mod registry;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

pub use registry::AdapterRegistry;

use crate::config::PipelineConfig;
use crate::error::{CodecError, DriverError, Result};
use crate::pipeline::{
    Dispatcher, EventCallback, EventEntry, EventPipeline, LogCallback, LogEntry, PipelineStats,
    StatusCallback, StatusEntry,
};
use crate::rpc::{RpcBridge, RpcError};
use crate::transport::Transport;

/// Identifies an open adapter; carried by every event it delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AdapterId(u32);

impl AdapterId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Builder for opening an [`Adapter`].
pub struct AdapterBuilder {
    id: AdapterId,
    config: PipelineConfig,
    on_events: Option<EventCallback>,
    on_log: Option<LogCallback>,
    on_status: Option<StatusCallback>,
}

impl AdapterBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            id: AdapterId::new(1),
            config: PipelineConfig::default(),
            on_events: None,
            on_log: None,
            on_status: None,
        }
    }

    /// Set the id stamped on events. [`AdapterRegistry`] assigns its own.
    pub fn id(mut self, id: AdapterId) -> Self {
        self.id = id;
        self
    }

    /// Replace the whole pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Capacity of each of the event, log and status queues.
    ///
    /// Default: 64.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Event batching interval. Zero dispatches events immediately.
    ///
    /// Default: zero.
    pub fn event_interval(mut self, interval: Duration) -> Self {
        self.config.event_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Name of the dispatch thread.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    pub fn on_events<F>(mut self, callback: F) -> Self
    where
        F: FnMut(Vec<EventEntry>) + Send + 'static,
    {
        self.on_events = Some(Box::new(callback));
        self
    }

    pub fn on_log<F>(mut self, callback: F) -> Self
    where
        F: FnMut(Vec<LogEntry>) + Send + 'static,
    {
        self.on_log = Some(Box::new(callback));
        self
    }

    pub fn on_status<F>(mut self, callback: F) -> Self
    where
        F: FnMut(Vec<StatusEntry>) + Send + 'static,
    {
        self.on_status = Some(Box::new(callback));
        self
    }

    /// Open the adapter over `transport`.
    pub fn open<T>(self, transport: T) -> Result<Adapter>
    where
        T: Transport + 'static,
    {
        // 1. Check configuration
        self.config.validate()?;
        let id = self.id;

        // 2. Create the pipeline and register callbacks
        let (pipeline, sink) = EventPipeline::new(id, &self.config);
        pipeline.set_boxed_callbacks(self.on_events, self.on_log, self.on_status);
        let pipeline = Arc::new(pipeline);

        // 3. Start the dispatch thread
        let dispatcher = Dispatcher::spawn(pipeline.clone(), &self.config.thread_name)?;

        // 4. Open the transport; events may arrive from here on
        let bridge = RpcBridge::new(Box::new(transport));
        if let Err(e) = bridge.open(sink) {
            tracing::error!("adapter {} failed to open transport: {}", id, e);
            pipeline.shutdown(Some(dispatcher));
            return Err(e.into());
        }

        // 5. Deliver anything queued while opening
        pipeline.arm();

        tracing::info!("adapter {} open", id);
        Ok(Adapter {
            id,
            bridge,
            pipeline,
            dispatcher: Mutex::new(Some(dispatcher)),
            closed: AtomicBool::new(false),
        })
    }
}

impl Default for AdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An open connection to a SoftDevice.
///
/// Commands may be issued from any thread; they are sent one at a time.
/// Callbacks run on the adapter's dispatch thread.
pub struct Adapter {
    id: AdapterId,
    bridge: RpcBridge,
    pipeline: Arc<EventPipeline>,
    dispatcher: Mutex<Option<Dispatcher>>,
    closed: AtomicBool,
}

impl Adapter {
    pub fn builder() -> AdapterBuilder {
        AdapterBuilder::new()
    }

    #[inline]
    pub fn id(&self) -> AdapterId {
        self.id
    }

    /// Run a command and return the SoftDevice result code.
    ///
    /// Failures inside the driver are reported as result codes too, see
    /// [`RpcError::result_code`].
    pub fn command<E, D>(&self, encode: E, decode: D) -> u32
    where
        E: FnOnce(&mut [u8]) -> std::result::Result<usize, CodecError>,
        D: FnOnce(&[u8]) -> std::result::Result<u32, CodecError>,
    {
        self.call(encode, decode).unwrap_or_else(|e| e.result_code())
    }

    /// Run a command that has no response.
    pub fn command_no_response<E>(&self, encode: E) -> u32
    where
        E: FnOnce(&mut [u8]) -> std::result::Result<usize, CodecError>,
    {
        self.call_no_response(encode)
            .unwrap_or_else(|e| e.result_code())
    }

    /// Like [`command`](Self::command), but keeps driver failures as errors.
    pub fn call<E, D>(&self, encode: E, decode: D) -> std::result::Result<u32, RpcError>
    where
        E: FnOnce(&mut [u8]) -> std::result::Result<usize, CodecError>,
        D: FnOnce(&[u8]) -> std::result::Result<u32, CodecError>,
    {
        self.bridge.call(encode, decode)
    }

    pub fn call_no_response<E>(&self, encode: E) -> std::result::Result<u32, RpcError>
    where
        E: FnOnce(&mut [u8]) -> std::result::Result<usize, CodecError>,
    {
        self.bridge.call_no_response(encode)
    }

    /// Replace the event callback and batching interval.
    pub fn set_event_callback<F>(&self, interval: Duration, callback: F)
    where
        F: FnMut(Vec<EventEntry>) + Send + 'static,
    {
        self.pipeline.set_event_callback(interval, callback);
    }

    pub fn set_log_callback<F>(&self, callback: F)
    where
        F: FnMut(Vec<LogEntry>) + Send + 'static,
    {
        self.pipeline.set_log_callback(callback);
    }

    pub fn set_status_callback<F>(&self, callback: F)
    where
        F: FnMut(Vec<StatusEntry>) + Send + 'static,
    {
        self.pipeline.set_status_callback(callback);
    }

    pub fn statistics(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Close the adapter.
    ///
    /// New commands are rejected, the command in flight completes, the
    /// transport is closed and events already queued are delivered before
    /// this returns. Closing twice is a no-op.
    ///
    /// Called from a callback, entries that callback queued on its own
    /// stream are delivered right after it returns.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // 1. Stop accepting commands and close the transport
        let transport_result = self.bridge.close();

        // 2. Stop the dispatcher and deliver what is left
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.pipeline.shutdown(dispatcher);

        match transport_result {
            Ok(()) => {
                tracing::info!("adapter {} closed", self.id);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("adapter {} closed with transport error: {}", self.id, e);
                Err(DriverError::from(e))
            }
        }
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!("error closing adapter {} on drop: {}", self.id, e);
        }
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}
