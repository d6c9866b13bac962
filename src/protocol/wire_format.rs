//! H5 header encoding and decoding.
//!
//! Implements the 4-byte three-wire header:
//! ```text
//! byte 0: ┌─────────┬─────────┬─────┬──────────┐
//!         │ seq (3) │ ack (3) │ crc │ reliable │   bit 0 → bit 7
//!         └─────────┴─────────┴─────┴──────────┘
//! byte 1: packet type (low nibble) | payload length bits 0-3 (high nibble)
//! byte 2: payload length bits 4-11
//! byte 3: header checksum over bytes 0-2
//! ```
//!
//! When the CRC flag is set, a CRC-16 over header and payload follows the
//! payload, least significant byte first.

use std::fmt;

use super::checksum::header_checksum;

/// Header size in bytes (fixed, exactly 4).
pub const H5_HEADER_LENGTH: usize = 4;

/// Trailing CRC size in bytes.
pub const H5_CRC_LENGTH: usize = 2;

/// Largest payload a 12-bit length field can describe.
pub const H5_MAX_PAYLOAD_LENGTH: usize = 0x0FFF;

/// Sequence and acknowledgement numbers wrap modulo 8.
pub const H5_SEQ_MODULO: u8 = 8;

const SEQ_MASK: u8 = 0b0000_0111;
const CRC_PRESENT_BIT: u8 = 0b0100_0000;
const RELIABLE_BIT: u8 = 0b1000_0000;

/// Link packet type carried in the low nibble of header byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Pure acknowledgement, no payload.
    Ack,
    HciCommand,
    AclData,
    SyncData,
    HciEvent,
    Reset,
    /// Serialized SoftDevice RPC traffic.
    VendorSpecific,
    /// SYNC / CONFIG / sleep handshake messages.
    LinkControl,
    /// Any other nibble; kept so it survives a decode/encode cycle.
    Reserved(u8),
}

impl PacketType {
    /// Build from the low 4 bits of `value`.
    pub fn from_nibble(value: u8) -> Self {
        match value & 0x0F {
            0 => PacketType::Ack,
            1 => PacketType::HciCommand,
            2 => PacketType::AclData,
            3 => PacketType::SyncData,
            4 => PacketType::HciEvent,
            5 => PacketType::Reset,
            14 => PacketType::VendorSpecific,
            15 => PacketType::LinkControl,
            other => PacketType::Reserved(other),
        }
    }

    /// Wire value (0-15).
    pub fn as_u8(self) -> u8 {
        match self {
            PacketType::Ack => 0,
            PacketType::HciCommand => 1,
            PacketType::AclData => 2,
            PacketType::SyncData => 3,
            PacketType::HciEvent => 4,
            PacketType::Reset => 5,
            PacketType::VendorSpecific => 14,
            PacketType::LinkControl => 15,
            PacketType::Reserved(value) => value & 0x0F,
        }
    }
}

impl From<u8> for PacketType {
    fn from(value: u8) -> Self {
        PacketType::from_nibble(value)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Ack => f.write_str("ACK"),
            PacketType::HciCommand => f.write_str("HCI_COMMAND"),
            PacketType::AclData => f.write_str("ACL_DATA"),
            PacketType::SyncData => f.write_str("SYNC_DATA"),
            PacketType::HciEvent => f.write_str("HCI_EVENT"),
            PacketType::Reset => f.write_str("RESET"),
            PacketType::VendorSpecific => f.write_str("VENDOR_SPECIFIC"),
            PacketType::LinkControl => f.write_str("LINK_CONTROL"),
            PacketType::Reserved(value) => write!(f, "RESERVED({})", value),
        }
    }
}

/// Decoded H5 header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H5Header {
    /// Sequence number of this packet (0-7).
    pub seq_num: u8,
    /// Next sequence number expected from the peer (0-7).
    pub ack_num: u8,
    /// Whether a CRC-16 trails the payload.
    pub crc_present: bool,
    /// Whether the packet takes part in acknowledgement and retransmission.
    pub reliable: bool,
    pub packet_type: PacketType,
    /// Payload length in bytes (0-4095).
    pub payload_length: u16,
}

impl H5Header {
    /// Create a new header. Sequence numbers are reduced modulo 8.
    pub fn new(
        seq_num: u8,
        ack_num: u8,
        crc_present: bool,
        reliable: bool,
        packet_type: PacketType,
        payload_length: u16,
    ) -> Self {
        Self {
            seq_num: seq_num & SEQ_MASK,
            ack_num: ack_num & SEQ_MASK,
            crc_present,
            reliable,
            packet_type,
            payload_length,
        }
    }

    /// Encode the header, including its checksum byte.
    ///
    /// # Example
    ///
    /// ```
    /// use sd_rpc_host::protocol::{H5Header, PacketType};
    ///
    /// let header = H5Header::new(3, 5, true, true, PacketType::HciCommand, 0);
    /// assert_eq!(header.encode(), [0xEB, 0x01, 0x00, 0x14]);
    /// ```
    pub fn encode(&self) -> [u8; H5_HEADER_LENGTH] {
        debug_assert!(usize::from(self.payload_length) <= H5_MAX_PAYLOAD_LENGTH);

        let mut first = (self.seq_num & SEQ_MASK) | ((self.ack_num & SEQ_MASK) << 3);
        if self.crc_present {
            first |= CRC_PRESENT_BIT;
        }
        if self.reliable {
            first |= RELIABLE_BIT;
        }

        let length = self.payload_length;
        let bytes = [
            first,
            self.packet_type.as_u8() | ((length << 4) as u8 & 0xF0),
            ((length >> 4) & 0xFF) as u8,
        ];

        [bytes[0], bytes[1], bytes[2], header_checksum(&bytes)]
    }

    /// Decode the header fields from the first four bytes of `buf`.
    ///
    /// Returns `None` if the buffer is too short. The checksum byte is not
    /// verified here; see [`H5Header::checksum_matches`].
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < H5_HEADER_LENGTH {
            return None;
        }

        let first = buf[0];
        Some(Self {
            seq_num: first & SEQ_MASK,
            ack_num: (first >> 3) & SEQ_MASK,
            crc_present: first & CRC_PRESENT_BIT != 0,
            reliable: first & RELIABLE_BIT != 0,
            packet_type: PacketType::from_nibble(buf[1]),
            payload_length: (u16::from(buf[1]) >> 4) | (u16::from(buf[2]) << 4),
        })
    }

    /// Check the checksum byte of an encoded header.
    #[inline]
    pub fn checksum_matches(buf: &[u8; H5_HEADER_LENGTH]) -> bool {
        header_checksum(&[buf[0], buf[1], buf[2]]) == buf[3]
    }

    /// Total encoded frame size implied by this header.
    #[inline]
    pub fn frame_length(&self) -> usize {
        let crc = if self.crc_present { H5_CRC_LENGTH } else { 0 };
        H5_HEADER_LENGTH + usize::from(self.payload_length) + crc
    }

    #[inline]
    pub fn is_ack(&self) -> bool {
        self.packet_type == PacketType::Ack
    }

    #[inline]
    pub fn is_link_control(&self) -> bool {
        self.packet_type == PacketType::LinkControl
    }
}

/// Next sequence number after `seq`, modulo 8.
///
/// Only the low three bits of `seq` are significant.
#[inline]
pub fn next_seq(seq: u8) -> u8 {
    ((seq & SEQ_MASK) + 1) % H5_SEQ_MODULO
}
