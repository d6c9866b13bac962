//! Loopback demo - one adapter, one command, one batch of events.
//!
//! The loopback transport stands in for a serial port: it answers every
//! command with a success code followed by the request bytes, and lets the
//! demo inject events as if the device had sent them.
//!
//! ```text
//! RUST_LOG=sd_rpc_host=debug cargo run --example loopback
//! ```

use std::sync::mpsc;
use std::time::Duration;

use sd_rpc_host::transport::LoopbackTransport;
use sd_rpc_host::{AdapterBuilder, CodecError, LogSeverity, StatusCode, NRF_SUCCESS};
use tracing_subscriber::EnvFilter;

/// Opcode of the version query in this demo.
const VERSION_GET: u8 = 0x7C;

fn main() -> sd_rpc_host::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (transport, device) = LoopbackTransport::new(|request, response| {
        response[0] = NRF_SUCCESS as u8;
        response[1..=request.len()].copy_from_slice(request);
        Ok(request.len() + 1)
    });

    let (batches_tx, batches_rx) = mpsc::channel();
    let adapter = AdapterBuilder::new()
        .event_interval(Duration::from_millis(50))
        .on_events(move |batch| {
            let _ = batches_tx.send(batch);
        })
        .on_log(|batch| {
            for entry in batch {
                println!("[{}] {}", entry.severity, entry.message);
            }
        })
        .on_status(|batch| {
            for entry in batch {
                println!("status {} at {}: {}", entry.id, entry.timestamp, entry.message);
            }
        })
        .open(transport)?;

    let mut version = None;
    let code = adapter.command(
        |buf| {
            buf[0] = VERSION_GET;
            Ok(1)
        },
        |response| {
            let (&code, rest) = response
                .split_first()
                .ok_or_else(|| CodecError::Malformed("empty response".into()))?;
            version = rest.first().copied();
            Ok(u32::from(code))
        },
    );
    println!("command returned {} (echoed opcode {:?})", code, version);

    device.inject_status(StatusCode::ConnectionActive, "Connection active");
    device.inject_log(LogSeverity::Info, "link established");
    for id in 0u8..5 {
        device.inject_event(&[0x10, id]);
    }

    match batches_rx.recv_timeout(Duration::from_secs(1)) {
        Ok(batch) => {
            println!("received {} events in one batch", batch.len());
            for entry in &batch {
                println!("  {} {:02x?}", entry.timestamp, entry.event.as_bytes());
            }
        }
        Err(_) => println!("no events received"),
    }

    adapter.close()?;

    let stats = adapter.statistics();
    println!(
        "dispatched {} events in {} batches (avg {:.1})",
        stats.events_dispatched,
        stats.event_batches,
        stats.average_event_batch()
    );
    if let Ok(json) = serde_json::to_string_pretty(&stats) {
        println!("{}", json);
    }
    Ok(())
}
