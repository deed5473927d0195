//! Ethereum-side adapter: the Gravity bridge contract and its ERC20s
//!
//! An adapter instance is bound to one sending account, the way a
//! wallet-backed provider is. `SimulatedEthereum` implements the contract
//! in-process; `EvmClient` talks to a real node.

use async_trait::async_trait;

use hilo_bridge_core::{DenomMetadata, EthAddress, EventClaim, SignedBatch};

use crate::error::AdapterError;

pub mod client;
pub mod contract;
pub mod simulated;

pub use client::EvmClient;
pub use simulated::SimulatedEthereum;

/// One bridge contract log, decoded if possible
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog {
    pub block: u64,
    pub log_index: u64,
    pub tx_hash: String,
    /// The decoded claim, or why decoding failed
    pub parsed: Result<EventClaim, String>,
}

/// Calls to and events from the Ethereum bridge contract
#[async_trait]
pub trait EthereumAdapter: Send + Sync {
    /// The sending account this adapter signs transactions with
    fn sender(&self) -> EthAddress;

    async fn latest_block(&self) -> Result<u64, AdapterError>;

    /// Bridge contract logs in `from_block..=to_block`, in chain order
    async fn query_events(&self, from_block: u64, to_block: u64)
        -> Result<Vec<EventLog>, AdapterError>;

    /// Execute a signed batch; the batch fee is paid to the sender
    async fn submit_batch(&self, batch: &SignedBatch) -> Result<String, AdapterError>;

    /// Nonce of the last executed batch for a token (0 if none)
    async fn last_batch_nonce(&self, token_contract: EthAddress) -> Result<u64, AdapterError>;

    /// Deploy the ERC20 for a Hilo denom; idempotent per denom
    async fn deploy_erc20(&self, metadata: &DenomMetadata) -> Result<EthAddress, AdapterError>;

    async fn query_token_balance(
        &self,
        token_contract: EthAddress,
        account: EthAddress,
    ) -> Result<u64, AdapterError>;

    /// Lock tokens in the bridge for a Hilo recipient
    async fn send_to_cosmos(
        &self,
        token_contract: EthAddress,
        cosmos_recipient: &str,
        amount: u64,
    ) -> Result<String, AdapterError>;
}
