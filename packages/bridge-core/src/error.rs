use thiserror::Error;

use crate::claims::ClaimKind;
use crate::types::{EthAddress, OrchestratorId};

/// Errors raised by the bridge module
///
/// `StaleNonce` and `DuplicateVote` are expected under normal operation
/// (late or repeated orchestrator submissions) and never change state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error(
        "invalid fee for {denom}: amount {amount}, bridge fee {bridge_fee} (minimum {minimum}), chain fee {chain_fee}"
    )]
    InvalidFee {
        denom: String,
        amount: u64,
        bridge_fee: u64,
        chain_fee: u64,
        minimum: u64,
    },

    #[error("fee denom {fee_denom} does not match transfer denom {denom}")]
    MismatchedFeeDenom { denom: String, fee_denom: String },

    #[error("stale nonce for {kind} claims: expected {expected}, got {got}")]
    StaleNonce {
        kind: ClaimKind,
        expected: u64,
        got: u64,
    },

    #[error("{orchestrator} already voted for claim {claim_hash}")]
    DuplicateVote {
        orchestrator: OrchestratorId,
        claim_hash: String,
    },

    #[error("{orchestrator} already voted for a different {kind} claim at nonce {nonce}")]
    ConflictingClaim {
        orchestrator: OrchestratorId,
        kind: ClaimKind,
        nonce: u64,
    },

    #[error("unknown orchestrator: {0}")]
    UnknownOrchestrator(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("batch {nonce} for {token} diverges from the locally computed batch")]
    BatchDivergence { token: EthAddress, nonce: u64 },

    #[error("no ERC20 mapping for denom {0}")]
    UnmappedDenom(String),

    #[error("denom {denom} is already mapped to {existing}")]
    DenomAlreadyMapped { denom: String, existing: EthAddress },

    #[error("ERC20 metadata for {0} does not match the denom metadata")]
    MetadataMismatch(String),

    #[error("insufficient funds in {account}: need {needed}{denom}, have {available}{denom}")]
    InsufficientFunds {
        account: String,
        denom: String,
        needed: u64,
        available: u64,
    },

    #[error("transfer {0} is not pending")]
    TransferNotPending(u64),

    #[error("unknown transfer {0}")]
    UnknownTransfer(u64),

    #[error("unknown or closed batch {nonce} for {token}")]
    UnknownBatch { token: EthAddress, nonce: u64 },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("arithmetic overflow")]
    Overflow,
}

impl BridgeError {
    /// Rejections that are expected during normal operation and self-heal
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            BridgeError::StaleNonce { .. } | BridgeError::DuplicateVote { .. }
        )
    }
}
