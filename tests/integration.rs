//! Integration tests for sd-rpc-host.
//!
//! These drive whole adapters over the loopback transport.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use sd_rpc_host::protocol::{self, LinkControl, PacketType};
use sd_rpc_host::transport::{LoopbackHandle, LoopbackTransport, TransportError};
use sd_rpc_host::{
    AdapterBuilder, AdapterId, AdapterRegistry, CallStage, CodecError, LogSeverity, RpcError,
    StatusCode, MAX_PKT_SIZE, NRF_ERROR_INTERNAL, NRF_ERROR_INVALID_STATE, NRF_SUCCESS,
};

const WAIT: Duration = Duration::from_secs(2);

/// Device that answers every command with `[result_code, request...]`.
fn device(result_code: u8) -> (LoopbackTransport, LoopbackHandle) {
    LoopbackTransport::new(move |request, response| {
        response[0] = result_code;
        response[1..=request.len()].copy_from_slice(request);
        Ok(request.len() + 1)
    })
}

/// Encoder writing a fixed opcode and one parameter byte.
fn encode_command(opcode: u8, param: u8) -> impl FnOnce(&mut [u8]) -> Result<usize, CodecError> {
    move |buf: &mut [u8]| {
        buf[0] = opcode;
        buf[1] = param;
        Ok(2)
    }
}

/// Test the literal frame for seq 3, ack 5, CRC, reliable, HCI command.
#[test]
fn test_known_frame_bytes() {
    let frame = protocol::encode(&[], 3, 5, true, true, PacketType::HciCommand);
    assert_eq!(frame.as_ref(), &[0xEB, 0x01, 0x00, 0x14, 0xB0, 0x7B]);

    let decoded = protocol::decode(&frame).unwrap();
    assert_eq!(decoded.seq_num(), 3);
    assert_eq!(decoded.ack_num(), 5);
    assert!(decoded.crc_present());
    assert!(decoded.is_reliable());
    assert_eq!(decoded.packet_type(), PacketType::HciCommand);
    assert!(decoded.payload().is_empty());
}

/// Test a command whose decoder fills an output value.
#[test]
fn test_command_populates_outputs() {
    let (transport, handle) = device(0);
    let adapter = AdapterBuilder::new().open(transport).unwrap();

    let mut echoed_param = None;
    let code = adapter.command(encode_command(0x7A, 0x42), |response| {
        if response.len() < 3 {
            return Err(CodecError::Malformed("short response".into()));
        }
        echoed_param = Some(response[2]);
        Ok(u32::from(response[0]))
    });

    assert_eq!(code, NRF_SUCCESS);
    assert_eq!(echoed_param, Some(0x42));
    assert_eq!(handle.sent_requests()[0].as_ref(), &[0x7A, 0x42]);

    // The link starts with a sync message, then the reliable command frame.
    let frames = handle.sent_frames();
    assert_eq!(frames[0], LinkControl::Sync.to_frame());
    assert!(protocol::decode(&frames[1]).unwrap().is_reliable());
}

/// Test that device result codes pass through unchanged.
#[test]
fn test_device_result_code_passes_through() {
    let (transport, _handle) = device(5);
    let adapter = AdapterBuilder::new().open(transport).unwrap();

    let code = adapter.command(encode_command(1, 0), |response| Ok(u32::from(response[0])));
    assert_eq!(code, 5);
}

/// Test that encode, send and decode failures are indistinguishable by code.
#[test]
fn test_rpc_failures_collapse() {
    let (transport, _handle) = LoopbackTransport::new(|request, _response| {
        if request[0] == 0xFF {
            Err(TransportError::Timeout)
        } else {
            Ok(0)
        }
    });
    let adapter = AdapterBuilder::new().open(transport).unwrap();

    let encode_failure = adapter.command(
        |_buf: &mut [u8]| {
            Err(CodecError::BufferTooSmall {
                needed: MAX_PKT_SIZE + 1,
                available: MAX_PKT_SIZE,
            })
        },
        |_| Ok(NRF_SUCCESS),
    );
    let send_failure = adapter.command(encode_command(0xFF, 0), |_| Ok(NRF_SUCCESS));
    let decode_failure = adapter.command(encode_command(1, 0), |response| {
        response
            .first()
            .map(|b| u32::from(*b))
            .ok_or_else(|| CodecError::Malformed("empty".into()))
    });

    assert_eq!(encode_failure, NRF_ERROR_INTERNAL);
    assert_eq!(send_failure, NRF_ERROR_INTERNAL);
    assert_eq!(decode_failure, NRF_ERROR_INTERNAL);

    assert_eq!(
        adapter.call(encode_command(0xFF, 0), |_| Ok(NRF_SUCCESS)),
        Err(RpcError::Internal {
            stage: CallStage::Send
        })
    );
}

/// Test that events queued within one interval arrive as one ordered batch.
#[test]
fn test_batched_events_keep_order() {
    let (transport, handle) = device(0);
    let (tx, rx) = mpsc::channel();
    let adapter = AdapterBuilder::new()
        .event_interval(Duration::from_millis(100))
        .on_events(move |batch| tx.send(batch).unwrap())
        .open(transport)
        .unwrap();

    assert!(handle.inject_event(b"E1"));
    assert!(handle.inject_event(b"E2"));
    assert!(handle.inject_event(b"E3"));

    let batch = rx.recv_timeout(WAIT).unwrap();
    let events: Vec<&[u8]> = batch.iter().map(|e| e.event.as_bytes()).collect();
    assert_eq!(events, vec![&b"E1"[..], &b"E2"[..], &b"E3"[..]]);
    assert!(batch.iter().all(|e| e.adapter_id == adapter.id()));

    // Nothing queued: later ticks must not call back with empty batches.
    assert!(rx.recv_timeout(Duration::from_millis(350)).is_err());

    let stats = adapter.statistics();
    assert_eq!(stats.events_dispatched, 3);
    assert_eq!(stats.event_batches, 1);
    assert_eq!(stats.max_event_batch, 3);
}

/// Test that a zero interval delivers each event without waiting.
#[test]
fn test_immediate_events() {
    let (transport, handle) = device(0);
    let (tx, rx) = mpsc::channel();
    let adapter = AdapterBuilder::new().open(transport).unwrap();
    adapter.set_event_callback(Duration::ZERO, move |batch| {
        for entry in batch {
            tx.send(entry.event.into_bytes()).unwrap();
        }
    });

    for i in 0..10u8 {
        assert!(handle.inject_event(&[i]));
        assert_eq!(rx.recv_timeout(WAIT).unwrap().as_ref(), &[i]);
    }
    assert_eq!(adapter.statistics().events_dispatched, 10);
}

/// Test switching from immediate delivery to batching while open.
#[test]
fn test_interval_change_while_open() {
    let (transport, handle) = device(0);
    let (tx, rx) = mpsc::channel();
    let adapter = AdapterBuilder::new().open(transport).unwrap();

    let sizes = tx.clone();
    adapter.set_event_callback(Duration::ZERO, move |batch| sizes.send(batch.len()).unwrap());
    handle.inject_event(b"a");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 1);

    adapter.set_event_callback(Duration::from_millis(100), move |batch| {
        tx.send(batch.len()).unwrap()
    });
    handle.inject_event(b"b");
    handle.inject_event(b"c");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);
}

/// Test that log and status entries are delivered on their own callbacks.
#[test]
fn test_log_and_status_streams() {
    let (transport, handle) = device(0);
    let log = Arc::new(Mutex::new(Vec::new()));
    let (status_tx, status_rx) = mpsc::channel();

    let sink = log.clone();
    let adapter = AdapterBuilder::new()
        .event_interval(Duration::from_secs(60))
        .on_log(move |batch| sink.lock().unwrap().extend(batch))
        .on_status(move |batch| status_tx.send(batch).unwrap())
        .open(transport)
        .unwrap();

    assert!(handle.inject_status(StatusCode::ConnectionActive, "Connection active"));
    let status = status_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(status[0].id, StatusCode::ConnectionActive);
    assert_eq!(status[0].message, "Connection active");
    assert!(!status[0].timestamp.is_empty());

    assert!(handle.inject_log(LogSeverity::Warning, "retransmitting"));
    adapter.close().unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].severity, LogSeverity::Warning);
    assert_eq!(log[0].message, "retransmitting");
}

/// Test that a full queue drops entries and counts them.
#[test]
fn test_queue_overflow_is_counted() {
    let (transport, handle) = device(0);
    let (tx, rx) = mpsc::channel();
    let adapter = AdapterBuilder::new()
        .queue_capacity(4)
        .event_interval(Duration::from_secs(60))
        .on_events(move |batch| tx.send(batch.len()).unwrap())
        .open(transport)
        .unwrap();

    let accepted = (0..6u8).filter(|i| handle.inject_event(&[*i])).count();
    assert_eq!(accepted, 4);
    assert_eq!(adapter.statistics().dropped_events, 2);

    adapter.close().unwrap();
    assert_eq!(rx.try_recv().unwrap(), 4);
}

/// Test that close waits for the command in flight.
#[test]
fn test_close_waits_for_inflight_command() {
    let (started_tx, started_rx) = mpsc::channel();
    let (transport, _handle) = LoopbackTransport::new(move |_request, response| {
        started_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(100));
        response[0] = 0;
        Ok(1)
    });
    let adapter = Arc::new(AdapterBuilder::new().open(transport).unwrap());

    let caller = {
        let adapter = adapter.clone();
        thread::spawn(move || adapter.command(encode_command(1, 0), |r| Ok(u32::from(r[0]))))
    };

    started_rx.recv_timeout(WAIT).unwrap();
    adapter.close().unwrap();

    assert_eq!(caller.join().unwrap(), NRF_SUCCESS);
    assert_eq!(
        adapter.command_no_response(encode_command(1, 0)),
        NRF_ERROR_INVALID_STATE
    );
}

/// Test that no event reaches a callback after close returns.
#[test]
fn test_no_delivery_after_close() {
    let (transport, handle) = device(0);
    let delivered = Arc::new(Mutex::new(0usize));
    let counter = delivered.clone();
    let adapter = AdapterBuilder::new()
        .on_events(move |batch| *counter.lock().unwrap() += batch.len())
        .open(transport)
        .unwrap();

    let producer = {
        let handle = handle.clone();
        thread::spawn(move || {
            (0..1000u32)
                .filter(|i| handle.inject_event(&i.to_le_bytes()))
                .count()
        })
    };

    thread::sleep(Duration::from_millis(5));
    adapter.close().unwrap();
    let after_close = *delivered.lock().unwrap();

    let accepted = producer.join().unwrap();
    thread::sleep(Duration::from_millis(50));

    // Every accepted event was delivered before close returned, and
    // nothing after.
    assert_eq!(*delivered.lock().unwrap(), after_close);
    assert_eq!(after_close, accepted);
    assert_eq!(adapter.statistics().events_dispatched as usize, accepted);
}

/// Test several adapters side by side in a registry.
#[test]
fn test_registry_isolates_adapters() {
    let registry = AdapterRegistry::new();
    let (tx, rx) = mpsc::channel();

    let (first_transport, first_device) = device(0);
    let first_tx = tx.clone();
    let first = registry
        .open(
            AdapterBuilder::new().on_events(move |batch| {
                first_tx.send(batch[0].adapter_id).unwrap();
            }),
            first_transport,
        )
        .unwrap();

    let (second_transport, second_device) = device(0);
    let second = registry
        .open(
            AdapterBuilder::new().on_events(move |batch| {
                tx.send(batch[0].adapter_id).unwrap();
            }),
            second_transport,
        )
        .unwrap();

    second_device.inject_event(b"x");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), second.id());
    first_device.inject_event(b"y");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), first.id());

    registry.close(first.id()).unwrap();
    assert_eq!(registry.ids(), vec![AdapterId::new(2)]);
    assert!(!first_device.is_open());
    assert!(second_device.is_open());

    registry.close_all().unwrap();
    assert!(registry.is_empty());
}

/// Test issuing blocking commands from async code.
#[tokio::test]
async fn test_commands_from_async_context() {
    let (transport, _handle) = device(0);
    let adapter = Arc::new(AdapterBuilder::new().open(transport).unwrap());

    let tasks: Vec<_> = (0..4u8)
        .map(|i| {
            let adapter = adapter.clone();
            tokio::task::spawn_blocking(move || {
                adapter.command(encode_command(i, i), |response| {
                    if response[2] == i {
                        Ok(u32::from(response[0]))
                    } else {
                        Err(CodecError::Malformed("response for another call".into()))
                    }
                })
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), NRF_SUCCESS);
    }
}
