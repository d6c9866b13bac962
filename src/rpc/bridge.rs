//! Encode, send, decode.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::codes::{MAX_PKT_SIZE, NRF_SUCCESS};
use super::{CallStage, RpcError};
use crate::error::CodecError;
use crate::pipeline::PipelineSink;
use crate::transport::{Transport, TransportError};

/// Decoder used by calls that expect no response.
type NoDecode = fn(&[u8]) -> Result<u32, CodecError>;

/// Runs RPC calls over one transport, one at a time.
///
/// The transport mutex is held for the duration of `send`, so a second
/// caller blocks until the first call has its reply.
pub struct RpcBridge {
    transport: Mutex<Box<dyn Transport>>,
    accepting: AtomicBool,
}

impl RpcBridge {
    /// Wrap a transport. Calls fail with [`RpcError::Closed`] until the
    /// bridge is opened.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport: Mutex::new(transport),
            accepting: AtomicBool::new(false),
        }
    }

    pub(crate) fn open(&self, sink: PipelineSink) -> Result<(), TransportError> {
        let mut transport = self.lock_transport();
        transport.open(sink)?;
        self.accepting.store(true, Ordering::Release);
        Ok(())
    }

    /// Stop accepting calls, wait for the one in flight and close the
    /// transport. Does nothing if the bridge is not open.
    pub(crate) fn close(&self) -> Result<(), TransportError> {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let mut transport = self.lock_transport();
        transport.close()
    }

    #[inline]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Run a command that expects a response.
    ///
    /// `encode` writes the request into the buffer and returns its length;
    /// `decode` parses the response and returns the SoftDevice result code.
    pub fn call<E, D>(&self, encode: E, decode: D) -> Result<u32, RpcError>
    where
        E: FnOnce(&mut [u8]) -> Result<usize, CodecError>,
        D: FnOnce(&[u8]) -> Result<u32, CodecError>,
    {
        self.execute(encode, Some(decode))
    }

    /// Run a command without a response. Returns [`NRF_SUCCESS`] once the
    /// request is delivered.
    pub fn call_no_response<E>(&self, encode: E) -> Result<u32, RpcError>
    where
        E: FnOnce(&mut [u8]) -> Result<usize, CodecError>,
    {
        self.execute(encode, None::<NoDecode>)
    }

    fn execute<E, D>(&self, encode: E, decode: Option<D>) -> Result<u32, RpcError>
    where
        E: FnOnce(&mut [u8]) -> Result<usize, CodecError>,
        D: FnOnce(&[u8]) -> Result<u32, CodecError>,
    {
        if !self.is_accepting() {
            return Err(RpcError::Closed);
        }

        let mut request = [0u8; MAX_PKT_SIZE];
        let request_len = encode(&mut request).map_err(|e| failure(CallStage::Encode, e))?;
        if request_len > MAX_PKT_SIZE {
            return Err(failure(
                CallStage::Encode,
                format_args!("encoder reported {} bytes", request_len),
            ));
        }
        let request = &request[..request_len];

        let mut transport = self.lock_transport();
        if !self.is_accepting() {
            return Err(RpcError::Closed);
        }

        let Some(decode) = decode else {
            transport
                .send(request, None, None)
                .map_err(|e| failure(CallStage::Send, e))?;
            return Ok(NRF_SUCCESS);
        };

        let mut response = [0u8; MAX_PKT_SIZE];
        let mut response_len = 0;
        transport
            .send(request, Some(&mut response), Some(&mut response_len))
            .map_err(|e| failure(CallStage::Send, e))?;
        drop(transport);

        if response_len > MAX_PKT_SIZE {
            return Err(failure(
                CallStage::Decode,
                TransportError::ResponseTooLarge {
                    len: response_len,
                    capacity: MAX_PKT_SIZE,
                },
            ));
        }

        decode(&response[..response_len]).map_err(|e| failure(CallStage::Decode, e))
    }

    fn lock_transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn failure(stage: CallStage, cause: impl fmt::Display) -> RpcError {
    tracing::debug!("RPC {} failed: {}", stage, cause);
    RpcError::internal(stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterId;
    use crate::config::PipelineConfig;
    use crate::pipeline::EventPipeline;
    use crate::rpc::codes::{NRF_ERROR_DATA_SIZE, NRF_ERROR_INTERNAL};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Transport with scripted behavior and call accounting.
    #[derive(Default)]
    struct Scripted {
        fail_send: bool,
        reported_len: Option<usize>,
        leave_len_unset: bool,
        reply: Vec<u8>,
        sends: Arc<AtomicUsize>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl Transport for Scripted {
        fn open(&mut self, _sink: PipelineSink) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn send(
            &mut self,
            _request: &[u8],
            response: Option<&mut [u8]>,
            response_len: Option<&mut usize>,
        ) -> Result<(), TransportError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.sends.fetch_add(1, Ordering::SeqCst);
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail_send {
                return Err(TransportError::Timeout);
            }
            if let Some(buffer) = response {
                buffer[..self.reply.len()].copy_from_slice(&self.reply);
            }
            if let Some(len) = response_len.filter(|_| !self.leave_len_unset) {
                *len = self.reported_len.unwrap_or(self.reply.len());
            }
            Ok(())
        }
    }

    fn open_bridge(transport: Scripted) -> RpcBridge {
        let bridge = RpcBridge::new(Box::new(transport));
        let (_pipeline, sink) = EventPipeline::new(AdapterId::new(1), &PipelineConfig::default());
        bridge.open(sink).unwrap();
        bridge
    }

    fn encode_ok(buf: &mut [u8]) -> Result<usize, CodecError> {
        buf[0] = 0x60;
        Ok(1)
    }

    fn decode_first_byte(response: &[u8]) -> Result<u32, CodecError> {
        response
            .first()
            .map(|b| u32::from(*b))
            .ok_or_else(|| CodecError::Malformed("empty response".into()))
    }

    #[test]
    fn test_call_returns_decoded_code() {
        let bridge = open_bridge(Scripted {
            reply: vec![NRF_ERROR_DATA_SIZE as u8],
            ..Default::default()
        });
        assert_eq!(
            bridge.call(encode_ok, decode_first_byte),
            Ok(NRF_ERROR_DATA_SIZE)
        );
    }

    #[test]
    fn test_call_no_response_returns_success() {
        let sends = Arc::new(AtomicUsize::new(0));
        let bridge = open_bridge(Scripted {
            sends: sends.clone(),
            ..Default::default()
        });
        assert_eq!(bridge.call_no_response(encode_ok), Ok(NRF_SUCCESS));
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_encode_failure_sends_nothing() {
        let sends = Arc::new(AtomicUsize::new(0));
        let bridge = open_bridge(Scripted {
            sends: sends.clone(),
            ..Default::default()
        });

        let result = bridge.call(
            |_buf: &mut [u8]| {
                Err(CodecError::BufferTooSmall {
                    needed: 500,
                    available: MAX_PKT_SIZE,
                })
            },
            decode_first_byte,
        );
        assert_eq!(
            result,
            Err(RpcError::Internal {
                stage: CallStage::Encode
            })
        );
        assert_eq!(sends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_every_stage_failure_collapses_to_internal() {
        let encode_fail = open_bridge(Scripted::default())
            .call(|_: &mut [u8]| Err(CodecError::Malformed("x".into())), decode_first_byte);
        let send_fail = open_bridge(Scripted {
            fail_send: true,
            ..Default::default()
        })
        .call(encode_ok, decode_first_byte);
        let decode_fail = open_bridge(Scripted::default()).call(encode_ok, decode_first_byte);

        for result in [encode_fail, send_fail, decode_fail] {
            let err = result.unwrap_err();
            assert!(matches!(err, RpcError::Internal { .. }));
            assert_eq!(err.result_code(), NRF_ERROR_INTERNAL);
        }
    }

    #[test]
    fn test_oversize_response_is_decode_failure() {
        let bridge = open_bridge(Scripted {
            reply: vec![0],
            reported_len: Some(MAX_PKT_SIZE + 1),
            ..Default::default()
        });
        assert_eq!(
            bridge.call(encode_ok, decode_first_byte),
            Err(RpcError::Internal {
                stage: CallStage::Decode
            })
        );
    }

    #[test]
    fn test_unreported_length_decodes_empty_response() {
        let bridge = open_bridge(Scripted {
            reply: vec![NRF_ERROR_DATA_SIZE as u8, 0xAA, 0xBB],
            leave_len_unset: true,
            ..Default::default()
        });
        let seen = bridge.call(encode_ok, |response: &[u8]| Ok(response.len() as u32));
        assert_eq!(seen, Ok(0));
        assert_eq!(
            bridge.call(encode_ok, decode_first_byte),
            Err(RpcError::Internal {
                stage: CallStage::Decode
            })
        );
    }

    #[test]
    fn test_oversize_request_is_encode_failure() {
        let bridge = open_bridge(Scripted::default());
        let result = bridge.call_no_response(|_buf: &mut [u8]| Ok(MAX_PKT_SIZE + 1));
        assert_eq!(
            result,
            Err(RpcError::Internal {
                stage: CallStage::Encode
            })
        );
    }

    #[test]
    fn test_closed_bridge_rejects_calls() {
        let unopened = RpcBridge::new(Box::new(Scripted::default()));
        assert_eq!(unopened.call_no_response(encode_ok), Err(RpcError::Closed));

        let bridge = open_bridge(Scripted::default());
        bridge.close().unwrap();
        assert!(!bridge.is_accepting());
        assert_eq!(
            bridge.call(encode_ok, decode_first_byte),
            Err(RpcError::Closed)
        );
        bridge.close().unwrap();
    }

    #[test]
    fn test_calls_are_serialized() {
        let max_active = Arc::new(AtomicUsize::new(0));
        let bridge = Arc::new(open_bridge(Scripted {
            reply: vec![0],
            max_active: max_active.clone(),
            delay: Duration::from_millis(5),
            ..Default::default()
        }));

        let callers: Vec<_> = (0..4)
            .map(|_| {
                let bridge = bridge.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        assert_eq!(bridge.call(encode_ok, decode_first_byte), Ok(0));
                    }
                })
            })
            .collect();
        for caller in callers {
            caller.join().unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }
}
