//! In-process transport that answers requests with a closure.
//!
//! Requests are framed as reliable H5 vendor-specific packets and checked
//! by decoding them again, the same way they would leave over a serial
//! link. The [`LoopbackHandle`] plays the device side: it sees every frame
//! that was sent and can inject events, log lines and status notifications
//! as if they arrived on the I/O thread.
//!
//! ```
//! use sd_rpc_host::transport::{LoopbackTransport, Transport};
//!
//! let (transport, device) = LoopbackTransport::new(|request, response| {
//!     response[..request.len()].copy_from_slice(request);
//!     Ok(request.len())
//! });
//! assert!(!device.is_open());
//! # drop(transport);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use super::{Transport, TransportError};
use crate::pipeline::{LogSeverity, PipelineSink, StatusCode};
use crate::protocol::{self, next_seq, H5Error, LinkControl, PacketType};

/// Produces the reply for one request: writes it into the buffer and
/// returns its length.
pub type Responder = Box<dyn FnMut(&[u8], &mut [u8]) -> Result<usize, TransportError> + Send>;

#[derive(Default)]
struct Shared {
    sink: Mutex<Option<PipelineSink>>,
    sent: Mutex<Vec<Bytes>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport that loops requests back to a responder closure.
pub struct LoopbackTransport {
    responder: Responder,
    shared: Arc<Shared>,
    seq_num: u8,
    ack_num: u8,
    open: bool,
}

impl LoopbackTransport {
    /// Create a transport and the handle for the simulated device.
    pub fn new<F>(responder: F) -> (Self, LoopbackHandle)
    where
        F: FnMut(&[u8], &mut [u8]) -> Result<usize, TransportError> + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let transport = Self {
            responder: Box::new(responder),
            shared: shared.clone(),
            seq_num: 0,
            ack_num: 0,
            open: false,
        };
        (transport, LoopbackHandle { shared })
    }

    fn record(&self, frame: Bytes) {
        lock(&self.shared.sent).push(frame);
    }
}

impl Transport for LoopbackTransport {
    fn open(&mut self, sink: PipelineSink) -> Result<(), TransportError> {
        tracing::debug!("loopback transport opened for adapter {}", sink.adapter_id());
        *lock(&self.shared.sink) = Some(sink);
        self.seq_num = 0;
        self.ack_num = 0;
        self.open = true;
        self.record(LinkControl::Sync.to_frame());
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        self.open = false;
        lock(&self.shared.sink).take();
        tracing::debug!("loopback transport closed");
        Ok(())
    }

    fn send(
        &mut self,
        request: &[u8],
        response: Option<&mut [u8]>,
        response_len: Option<&mut usize>,
    ) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }

        let frame = protocol::encode(
            request,
            self.seq_num,
            self.ack_num,
            true,
            true,
            PacketType::VendorSpecific,
        );
        self.seq_num = next_seq(self.seq_num);
        self.record(frame.clone());

        let received = protocol::decode(&frame)?;

        if let Some(buffer) = response {
            let len = (self.responder)(received.payload(), buffer)?;
            self.ack_num = next_seq(self.ack_num);
            if let Some(out) = response_len {
                *out = len;
            }
        }
        Ok(())
    }
}

/// Device side of a [`LoopbackTransport`].
#[derive(Clone)]
pub struct LoopbackHandle {
    shared: Arc<Shared>,
}

impl LoopbackHandle {
    /// Whether the transport currently holds a sink.
    pub fn is_open(&self) -> bool {
        lock(&self.shared.sink).is_some()
    }

    /// Deliver an event as if read from the link.
    ///
    /// Returns `false` if the transport is closed or the event was dropped.
    pub fn inject_event(&self, event: &[u8]) -> bool {
        match lock(&self.shared.sink).as_mut() {
            Some(sink) => sink.on_event_received(event),
            None => false,
        }
    }

    /// Decode a raw H5 frame and deliver its payload as an event.
    ///
    /// Link control and other non-event packets are accepted but not
    /// delivered; `Ok(false)` is returned for them.
    pub fn inject_frame(&self, frame: &[u8]) -> Result<bool, H5Error> {
        let frame = protocol::decode(frame)?;
        match frame.packet_type() {
            PacketType::VendorSpecific => Ok(self.inject_event(frame.payload())),
            PacketType::LinkControl => {
                tracing::trace!("link control: {:?}", LinkControl::parse(frame.payload()));
                Ok(false)
            }
            other => {
                tracing::trace!("ignoring injected {} packet", other);
                Ok(false)
            }
        }
    }

    pub fn inject_log(&self, severity: LogSeverity, message: &str) -> bool {
        match lock(&self.shared.sink).as_mut() {
            Some(sink) => sink.on_log_received(severity, message),
            None => false,
        }
    }

    pub fn inject_status(&self, id: StatusCode, message: &str) -> bool {
        match lock(&self.shared.sink).as_mut() {
            Some(sink) => sink.on_status_received(id, message),
            None => false,
        }
    }

    /// Every frame written to the link so far, link control included.
    pub fn sent_frames(&self) -> Vec<Bytes> {
        lock(&self.shared.sent).clone()
    }

    /// Payloads of the command frames written so far.
    pub fn sent_requests(&self) -> Vec<Bytes> {
        lock(&self.shared.sent)
            .iter()
            .filter_map(|frame| protocol::decode(frame).ok())
            .filter(|frame| frame.packet_type() == PacketType::VendorSpecific)
            .map(|frame| Bytes::copy_from_slice(frame.payload()))
            .collect()
    }
}
