//! Protocol module - H5 (three-wire) framing.
//!
//! This module implements the link-layer packet format used to carry
//! serialized RPC traffic over a byte stream:
//! - 4-byte header with sequence numbers, flags, type and length
//! - header checksum and optional CRC-16
//! - link control message patterns
//!
//! SLIP byte stuffing and the acknowledgement state machine are the
//! transport's concern; everything here works on complete, unescaped frames.

mod checksum;
mod frame;
mod link_control;
mod wire_format;

pub use checksum::{crc16, crc16_update, header_checksum, CRC16_SEED};
pub use frame::{build_frame, decode, encode, H5Error, H5Frame};
pub use link_control::{LinkControl, DEFAULT_SYNC_CONFIG};
pub use wire_format::{
    next_seq, H5Header, PacketType, H5_CRC_LENGTH, H5_HEADER_LENGTH, H5_MAX_PAYLOAD_LENGTH,
    H5_SEQ_MODULO,
};
