//! Header checksum and CRC-16 used by H5 frames.
//!
//! Both functions must match the peer firmware bit for bit. The CRC is the
//! byte-wise shift/xor form used by the SoftDevice serialization transport;
//! do not replace it with a table-driven library implementation.

/// Initial value of the running CRC.
pub const CRC16_SEED: u16 = 0xFFFF;

/// Two's-complement checksum over the first three header bytes.
///
/// Adding the returned byte to the three input bytes gives 0 modulo 256.
#[inline]
pub fn header_checksum(header: &[u8; 3]) -> u8 {
    let sum = header
        .iter()
        .fold(0u8, |acc, &byte| acc.wrapping_add(byte));
    (!sum).wrapping_add(1)
}

/// CRC-16 over `data`, starting from [`CRC16_SEED`].
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(CRC16_SEED, |crc, &byte| crc16_update(crc, byte))
}

/// Fold one byte into a running CRC.
#[inline]
pub fn crc16_update(crc: u16, byte: u8) -> u16 {
    let mut crc = crc.swap_bytes();
    crc ^= u16::from(byte);
    crc ^= (crc & 0x00FF) >> 4;
    crc ^= crc << 12;
    crc ^= (crc & 0x00FF) << 5;
    crc
}
