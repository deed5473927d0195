use hilo_bridge_core::BridgeError;
use thiserror::Error;

/// Errors returned by the chain adapters
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    /// Node unreachable or timed out; worth retrying
    #[error("adapter unavailable: {0}")]
    Unavailable(String),

    /// The bridge module rejected the message
    #[error(transparent)]
    Rejected(#[from] BridgeError),

    /// The Ethereum contract reverted the call
    #[error("ethereum call reverted: {0}")]
    Reverted(String),

    /// An event that could not be decoded
    #[error("malformed event: {0}")]
    Malformed(String),
}

impl AdapterError {
    /// Rejections that mean "someone already did this" and need no action
    pub fn is_benign(&self) -> bool {
        matches!(self, AdapterError::Rejected(e) if e.is_benign())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::Unavailable(_) => "unavailable",
            AdapterError::Rejected(_) => "rejected",
            AdapterError::Reverted(_) => "reverted",
            AdapterError::Malformed(_) => "malformed",
        }
    }
}
