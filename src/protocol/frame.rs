//! Complete H5 frames: header, payload and optional CRC.
//!
//! Frames are built fresh for every transmission and parsed in one pass on
//! receipt. Decoding never accepts a partially valid frame.
//!
//! # Example
//!
//! ```
//! use sd_rpc_host::protocol::{decode, encode, PacketType};
//!
//! let bytes = encode(b"hello", 1, 0, true, true, PacketType::VendorSpecific);
//! let frame = decode(&bytes).unwrap();
//!
//! assert_eq!(frame.seq_num(), 1);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::checksum::crc16;
use super::wire_format::{H5Header, PacketType, H5_CRC_LENGTH, H5_HEADER_LENGTH};

/// Reasons a received frame is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum H5Error {
    /// Fewer bytes than a header.
    #[error("frame of {0} bytes is shorter than the H5 header")]
    InvalidLength(usize),

    /// Length, checksum or CRC does not match the contents.
    #[error("invalid frame: {0}")]
    InvalidData(&'static str),
}

/// A parsed H5 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H5Frame {
    /// Decoded header.
    pub header: H5Header,
    /// Payload bytes.
    pub payload: Bytes,
}

impl H5Frame {
    /// Create a frame from a header and payload.
    ///
    /// The header's payload length is taken from `payload`.
    pub fn new(mut header: H5Header, payload: Bytes) -> Self {
        debug_assert!(payload.len() <= super::H5_MAX_PAYLOAD_LENGTH);
        header.payload_length = payload.len() as u16;
        Self { header, payload }
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn seq_num(&self) -> u8 {
        self.header.seq_num
    }

    #[inline]
    pub fn ack_num(&self) -> u8 {
        self.header.ack_num
    }

    #[inline]
    pub fn crc_present(&self) -> bool {
        self.header.crc_present
    }

    #[inline]
    pub fn is_reliable(&self) -> bool {
        self.header.reliable
    }

    #[inline]
    pub fn packet_type(&self) -> PacketType {
        self.header.packet_type
    }

    /// Encode this frame to wire bytes.
    pub fn to_bytes(&self) -> Bytes {
        build_frame(&self.header, &self.payload)
    }
}

/// Build an H5 frame from its parts.
///
/// The caller guarantees `payload.len() <= 4095`.
pub fn encode(
    payload: &[u8],
    seq_num: u8,
    ack_num: u8,
    crc_present: bool,
    reliable: bool,
    packet_type: PacketType,
) -> Bytes {
    let header = H5Header::new(
        seq_num,
        ack_num,
        crc_present,
        reliable,
        packet_type,
        payload.len() as u16,
    );
    build_frame(&header, payload)
}

/// Encode `header` followed by `payload` and, if flagged, the CRC.
pub fn build_frame(header: &H5Header, payload: &[u8]) -> Bytes {
    debug_assert_eq!(usize::from(header.payload_length), payload.len());

    let mut buf = BytesMut::with_capacity(header.frame_length());
    buf.put_slice(&header.encode());
    buf.put_slice(payload);

    if header.crc_present {
        let crc = crc16(&buf);
        buf.put_u16_le(crc);
    }

    buf.freeze()
}

/// Parse and verify one complete H5 frame.
///
/// Fails with [`H5Error::InvalidLength`] when `frame` is shorter than a
/// header, and with [`H5Error::InvalidData`] when the total length, header
/// checksum or CRC does not match.
pub fn decode(frame: &[u8]) -> Result<H5Frame, H5Error> {
    let header = H5Header::decode(frame).ok_or(H5Error::InvalidLength(frame.len()))?;

    if frame.len() != header.frame_length() {
        return Err(H5Error::InvalidData("length does not match header"));
    }

    let header_bytes = [frame[0], frame[1], frame[2], frame[3]];
    if !H5Header::checksum_matches(&header_bytes) {
        return Err(H5Error::InvalidData("header checksum mismatch"));
    }

    let payload_end = H5_HEADER_LENGTH + usize::from(header.payload_length);

    if header.crc_present {
        let expected = crc16(&frame[..payload_end]);
        let received = u16::from_le_bytes([frame[payload_end], frame[payload_end + 1]]);
        if expected != received {
            return Err(H5Error::InvalidData("CRC mismatch"));
        }
        debug_assert_eq!(frame.len(), payload_end + H5_CRC_LENGTH);
    }

    let payload = if header.payload_length == 0 {
        Bytes::new()
    } else {
        Bytes::copy_from_slice(&frame[H5_HEADER_LENGTH..payload_end])
    };

    Ok(H5Frame { header, payload })
}
