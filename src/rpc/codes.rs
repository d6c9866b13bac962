//! SoftDevice result codes and packet limits used by the RPC layer.

/// Largest serialized command or response in bytes.
pub const MAX_PKT_SIZE: usize = 384;

pub const NRF_SUCCESS: u32 = 0;
pub const NRF_ERROR_INTERNAL: u32 = 3;
pub const NRF_ERROR_INVALID_PARAM: u32 = 7;
pub const NRF_ERROR_INVALID_STATE: u32 = 8;
pub const NRF_ERROR_DATA_SIZE: u32 = 12;
