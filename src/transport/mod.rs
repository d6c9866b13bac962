//! Transport module - the link between the host and the SoftDevice.
//!
//! A [`Transport`] owns the serial/H5 stack. The adapter opens it with the
//! [`PipelineSink`] for that adapter; the transport's I/O thread pushes every
//! unsolicited event, log line and status notification into the sink.
//! Commands go the other way through [`Transport::send`], which blocks until
//! the response arrives (or the transport gives up).
//!
//! Retransmission, acknowledgement and link establishment are the
//! transport's business; the RPC layer only sees a blocking request/response.

mod loopback;

pub use loopback::{LoopbackHandle, LoopbackTransport, Responder};

use thiserror::Error;

use crate::pipeline::PipelineSink;
use crate::protocol::H5Error;

/// Errors reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// `send` called before `open` or after `close`.
    #[error("transport is not open")]
    NotOpen,

    /// The peer did not answer in time.
    #[error("timed out waiting for response")]
    Timeout,

    /// The response does not fit the destination buffer.
    #[error("response too large: {len} bytes, buffer holds {capacity}")]
    ResponseTooLarge { len: usize, capacity: usize },

    /// A frame on the link failed to decode.
    #[error("framing error: {0}")]
    Framing(#[from] H5Error),

    /// Underlying device I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Blocking request/response link to the SoftDevice.
///
/// Implementations are driven by one adapter; `send` is never called
/// concurrently.
pub trait Transport: Send {
    /// Start the link. Events received from now on go to `sink`.
    fn open(&mut self, sink: PipelineSink) -> Result<(), TransportError>;

    /// Stop the link and release the sink.
    fn close(&mut self) -> Result<(), TransportError>;

    /// Send `request` and wait for the reply.
    ///
    /// When `response` is given, the reply is written into it and its length
    /// stored in `response_len`. The buffer's capacity is `response.len()`;
    /// `response_len` is 0 on entry and a transport that leaves it untouched
    /// reports an empty reply. Without a response buffer the call returns
    /// once the request is delivered.
    fn send(
        &mut self,
        request: &[u8],
        response: Option<&mut [u8]>,
        response_len: Option<&mut usize>,
    ) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, sink: PipelineSink) -> Result<(), TransportError> {
        (**self).open(sink)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn send(
        &mut self,
        request: &[u8],
        response: Option<&mut [u8]>,
        response_len: Option<&mut usize>,
    ) -> Result<(), TransportError> {
        (**self).send(request, response, response_len)
    }
}
