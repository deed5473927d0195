//! Hilo-side adapter: messages to and queries of the bridge module

use async_trait::async_trait;

use hilo_bridge_core::{
    Batch, BatchConfirm, BatchStatus, BridgeParams, ClaimKind, Coin, DenomMetadata, EthAddress,
    EventClaim, OrchestratorId, PoolCandidate, SignedBatch, ValsetSnapshot, VoteOutcome,
};

use crate::error::AdapterError;

pub mod local;

pub use local::LocalCosmosChain;

/// Calls into the Hilo bridge module
#[async_trait]
pub trait CosmosAdapter: Send + Sync {
    /// Submit a signed attestation vote for an Ethereum event
    async fn submit_vote(
        &self,
        orchestrator: &OrchestratorId,
        claim: EventClaim,
        signature: Vec<u8>,
    ) -> Result<VoteOutcome, AdapterError>;

    /// Submit a signature over a batch checkpoint
    async fn submit_batch_confirm(
        &self,
        orchestrator: &OrchestratorId,
        token_contract: EthAddress,
        nonce: u64,
        signature: Vec<u8>,
    ) -> Result<BatchStatus, AdapterError>;

    /// Report that a signed batch was broadcast to Ethereum
    async fn mark_batch_submitted(
        &self,
        token_contract: EthAddress,
        nonce: u64,
        tx_hash: &str,
    ) -> Result<(), AdapterError>;

    /// Batches still collecting signatures
    async fn query_pending_batches(&self) -> Result<Vec<Batch>, AdapterError>;

    /// Batches with signature quorum, ready to relay
    async fn query_signed_batches(&self) -> Result<Vec<SignedBatch>, AdapterError>;

    async fn query_batch_confirms(
        &self,
        token_contract: EthAddress,
        nonce: u64,
    ) -> Result<Vec<BatchConfirm>, AdapterError>;

    /// Pending transfers of a denom with their eligibility heights
    async fn query_outgoing_pool(&self, denom: &str) -> Result<Vec<PoolCandidate>, AdapterError>;

    async fn query_balance(&self, account: &str, denom: &str) -> Result<Coin, AdapterError>;

    async fn query_valset(&self) -> Result<ValsetSnapshot, AdapterError>;

    /// Nonce of the last Observed claim in a stream
    async fn last_observed_nonce(&self, kind: ClaimKind) -> Result<u64, AdapterError>;

    /// Denoms whose ERC20 has been requested but not yet registered
    async fn query_pending_deployments(&self) -> Result<Vec<DenomMetadata>, AdapterError>;

    async fn query_params(&self) -> Result<BridgeParams, AdapterError>;
}
