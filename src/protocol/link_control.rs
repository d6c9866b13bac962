//! Link control messages carried in `LinkControl` packets.
//!
//! The retransmission state machine that sends these lives in the transport;
//! this module only knows their byte patterns.

use bytes::Bytes;

use super::frame::build_frame;
use super::wire_format::{H5Header, PacketType};

/// Configuration field sent with SYNC CONFIG: sliding window 1, CRC on.
pub const DEFAULT_SYNC_CONFIG: u8 = 0x11;

const SYNC: [u8; 2] = [0x01, 0x7E];
const SYNC_RESPONSE: [u8; 2] = [0x02, 0x7D];
const SYNC_CONFIG: [u8; 2] = [0x03, 0xFC];
const SYNC_CONFIG_RESPONSE: [u8; 2] = [0x04, 0x7B];
const WAKEUP: [u8; 2] = [0x05, 0xFA];
const WOKEN: [u8; 2] = [0x06, 0xF9];
const SLEEP: [u8; 2] = [0x07, 0x78];

/// A three-wire link establishment or power message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkControl {
    Sync,
    SyncResponse,
    SyncConfig(u8),
    SyncConfigResponse(u8),
    Wakeup,
    Woken,
    Sleep,
}

impl LinkControl {
    /// Payload bytes for this message.
    pub fn to_payload(self) -> Vec<u8> {
        match self {
            LinkControl::Sync => SYNC.to_vec(),
            LinkControl::SyncResponse => SYNC_RESPONSE.to_vec(),
            LinkControl::SyncConfig(config) => vec![SYNC_CONFIG[0], SYNC_CONFIG[1], config],
            LinkControl::SyncConfigResponse(config) => {
                vec![SYNC_CONFIG_RESPONSE[0], SYNC_CONFIG_RESPONSE[1], config]
            }
            LinkControl::Wakeup => WAKEUP.to_vec(),
            LinkControl::Woken => WOKEN.to_vec(),
            LinkControl::Sleep => SLEEP.to_vec(),
        }
    }

    /// Recognize a link control payload. Unknown patterns yield `None`.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            [0x01, 0x7E] => Some(LinkControl::Sync),
            [0x02, 0x7D] => Some(LinkControl::SyncResponse),
            [0x03, 0xFC, config] => Some(LinkControl::SyncConfig(*config)),
            [0x04, 0x7B, config] => Some(LinkControl::SyncConfigResponse(*config)),
            [0x05, 0xFA] => Some(LinkControl::Wakeup),
            [0x06, 0xF9] => Some(LinkControl::Woken),
            [0x07, 0x78] => Some(LinkControl::Sleep),
            _ => None,
        }
    }

    /// Encode as an unreliable, CRC-less `LinkControl` frame.
    pub fn to_frame(self) -> Bytes {
        let payload = self.to_payload();
        let header = H5Header::new(
            0,
            0,
            false,
            false,
            PacketType::LinkControl,
            payload.len() as u16,
        );
        build_frame(&header, &payload)
    }
}
