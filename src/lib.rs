//! # sd-rpc-host
//!
//! Host side of a serialized SoftDevice: the application runs on a PC and
//! drives a Bluetooth LE stack on a connected chip through RPC over a
//! serial link.
//!
//! ## Architecture
//!
//! - **Framing** ([`protocol`]): H5 three-wire packets with header checksum
//!   and CRC-16
//! - **Commands** ([`rpc`]): blocking encode, send, decode calls, one at a
//!   time per adapter
//! - **Events** ([`pipeline`]): lock-free queues from the I/O thread to a
//!   dispatch thread that hands batches to application callbacks
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use sd_rpc_host::{AdapterRegistry, AdapterBuilder};
//! use sd_rpc_host::transport::LoopbackTransport;
//!
//! let registry = AdapterRegistry::new();
//! let (transport, device) = LoopbackTransport::new(|_request, _response| Ok(0));
//!
//! let adapter = registry
//!     .open(
//!         AdapterBuilder::new()
//!             .event_interval(Duration::from_millis(20))
//!             .on_events(|batch| println!("received {} events", batch.len())),
//!         transport,
//!     )
//!     .unwrap();
//!
//! device.inject_event(&[0x01, 0x10]);
//! registry.close(adapter.id()).unwrap();
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod rpc;
pub mod transport;

pub use adapter::{Adapter, AdapterBuilder, AdapterId, AdapterRegistry};
pub use config::PipelineConfig;
pub use error::{CodecError, DriverError, Result};
pub use pipeline::{
    EventEntry, EventRecord, LogEntry, LogSeverity, PipelineSink, PipelineStats, StatusCode,
    StatusEntry,
};
pub use rpc::{
    CallStage, RpcError, MAX_PKT_SIZE, NRF_ERROR_DATA_SIZE, NRF_ERROR_INTERNAL,
    NRF_ERROR_INVALID_PARAM, NRF_ERROR_INVALID_STATE, NRF_SUCCESS,
};
pub use transport::{Transport, TransportError};
