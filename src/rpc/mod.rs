//! RPC module - synchronous command calls over a [`Transport`].
//!
//! Every SoftDevice command follows the same shape: serialize the request,
//! send it and block for the reply, then decode the reply into the caller's
//! output values and a result code. [`RpcBridge`] implements that shape once;
//! commands only supply the encode and decode closures.
//!
//! [`Transport`]: crate::transport::Transport

mod bridge;
pub mod codes;

use std::fmt;

use thiserror::Error;

pub use bridge::RpcBridge;
pub use codes::{
    MAX_PKT_SIZE, NRF_ERROR_DATA_SIZE, NRF_ERROR_INTERNAL, NRF_ERROR_INVALID_PARAM,
    NRF_ERROR_INVALID_STATE, NRF_SUCCESS,
};

/// Step of an RPC call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStage {
    Encode,
    Send,
    Decode,
}

impl fmt::Display for CallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallStage::Encode => "encode",
            CallStage::Send => "send",
            CallStage::Decode => "decode",
        };
        f.write_str(name)
    }
}

/// Failure of an RPC call before the SoftDevice produced a result code.
///
/// Encode, send and decode failures all surface as [`RpcError::Internal`];
/// the stage is kept for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("internal error during {stage}")]
    Internal { stage: CallStage },

    /// The adapter is closing or closed.
    #[error("adapter is closed")]
    Closed,
}

impl RpcError {
    pub(crate) fn internal(stage: CallStage) -> Self {
        RpcError::Internal { stage }
    }

    /// SoftDevice result code reported to the caller for this error.
    pub fn result_code(&self) -> u32 {
        match self {
            RpcError::Internal { .. } => NRF_ERROR_INTERNAL,
            RpcError::Closed => NRF_ERROR_INVALID_STATE,
        }
    }
}
