//! Error types for sd-rpc-host.

use thiserror::Error;

use crate::protocol::H5Error;
use crate::rpc::RpcError;
use crate::transport::TransportError;

/// Failure reported by a command encode or decode closure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The destination buffer cannot hold the encoded command.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// The response bytes do not match the expected layout.
    #[error("malformed packet: {0}")]
    Malformed(String),
}

/// Top-level error type for adapter operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// I/O error while spawning the dispatch thread or its runtime.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON configuration could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// H5 frame rejected by the codec.
    #[error("H5 framing error: {0}")]
    Framing(#[from] H5Error),

    /// Transport failed to open, close or send.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// RPC call failed before a result code was produced.
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// The adapter is not open.
    #[error("adapter is closed")]
    Closed,

    /// Configuration value out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias using DriverError.
pub type Result<T> = std::result::Result<T, DriverError>;
