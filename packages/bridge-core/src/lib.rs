//! Hilo Bridge Core: the Hilo-side state machine of the Hilo ⇄ Ethereum bridge
//!
//! This crate is shared by the bridge module and the orchestrators:
//!
//! - **Outgoing Pool** - "send to Ethereum" requests waiting to be batched
//! - **Batch Builder** - deterministic fee-priority batches and their checkpoints
//! - **Attestation Engine** - 2/3-power threshold voting on Ethereum events
//! - **Denom Registry** - denom ⇄ ERC20 mapping and minimum bridge fees
//! - **Bridge Module** - the above wired to a bank ledger, block by block
//!
//! Orchestrators use [`batch::verify_batch`] to recompute a batch from their
//! own view of the pool before signing it, and the [`crypto`] helpers to sign
//! claims and checkpoints with their Ethereum key.

pub mod address_codec;
pub mod attestation;
pub mod bank;
pub mod batch;
pub mod claims;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod module;
pub mod pool;
pub mod registry;
pub mod types;
pub mod valset;

pub use address_codec::{
    decode_bech32_address, encode_bech32_address, parse_eth_address, parse_voucher_denom,
    validate_cosmos_address, voucher_denom,
};
pub use attestation::{Attestation, AttestationEngine, AttestationStatus, VoteOutcome};
pub use batch::{
    batch_checkpoint, select_for_batch, total_fee, verify_batch, Batch, BatchBuilderConfig,
    BatchTransfer, PoolCandidate, SignedBatch,
};
pub use claims::{BatchExecutedClaim, ClaimKind, DepositClaim, Erc20DeployedClaim, EventClaim};
pub use crypto::{recover_signer, sign_digest, verify_signature};
pub use error::BridgeError;
pub use hash::{bytes32_to_hex, keccak256};
pub use module::{BatchConfirm, BridgeModule, BridgeParams};
pub use pool::{NewTransfer, OutgoingPool, OutgoingTransfer};
pub use registry::{DenomMetadata, DenomRegistry, FeeSchedule, TokenOrigin};
pub use types::{
    BatchStatus, Coin, EthAddress, OrchestratorId, TransferStatus, BRIDGE_MODULE_ACCOUNT,
    COMMUNITY_POOL_ACCOUNT, FEE_COLLECTOR_ACCOUNT, HILO_BECH32_PREFIX,
};
pub use valset::{quorum_reached, ValidatorPower, ValsetSnapshot};
