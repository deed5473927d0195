//! In-process Hilo chain backed by the bridge module
//!
//! Used by the devnet and integration tests. Every message is applied to the
//! shared `BridgeModule` under one lock, which serializes state transitions
//! the way block execution would.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use hilo_bridge_core::{
    Batch, BatchConfirm, BatchStatus, BridgeModule, BridgeParams, ClaimKind, Coin, DenomMetadata,
    EthAddress, EventClaim, OrchestratorId, PoolCandidate, SignedBatch, ValsetSnapshot,
    VoteOutcome,
};

use super::CosmosAdapter;
use crate::error::AdapterError;

/// Shared handle to an in-process Hilo chain
#[derive(Clone)]
pub struct LocalCosmosChain {
    module: Arc<Mutex<BridgeModule>>,
    online: Arc<AtomicBool>,
}

impl LocalCosmosChain {
    pub fn new(module: BridgeModule) -> Self {
        Self {
            module: Arc::new(Mutex::new(module)),
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate the node going away (calls return `Unavailable`)
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), AdapterError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AdapterError::Unavailable("hilo node unreachable".to_string()))
        }
    }

    /// Run a closure against the module state
    pub async fn with_module<R>(&self, f: impl FnOnce(&mut BridgeModule) -> R) -> R {
        let mut module = self.module.lock().await;
        f(&mut module)
    }

    // ========================================================================
    // User operations
    // ========================================================================

    pub async fn send_to_eth(
        &self,
        sender: &str,
        eth_recipient: EthAddress,
        amount: Coin,
        bridge_fee: Coin,
        chain_fee: Option<Coin>,
    ) -> Result<u64, AdapterError> {
        self.check_online()?;
        let mut module = self.module.lock().await;
        Ok(module.send_to_eth(sender, eth_recipient, amount, bridge_fee, chain_fee)?)
    }

    pub async fn cancel_send_to_eth(&self, sender: &str, id: u64) -> Result<Coin, AdapterError> {
        self.check_online()?;
        let mut module = self.module.lock().await;
        Ok(module.cancel_send_to_eth(sender, id)?)
    }

    /// Finish the current block; returns the batches built in it
    pub async fn produce_block(&self) -> Vec<Batch> {
        let mut module = self.module.lock().await;
        let built = module.end_block();
        debug!(height = module.height(), batches = built.len(), "Hilo block produced");
        built
    }

    pub async fn height(&self) -> u64 {
        self.module.lock().await.height()
    }
}

#[async_trait]
impl CosmosAdapter for LocalCosmosChain {
    async fn submit_vote(
        &self,
        orchestrator: &OrchestratorId,
        claim: EventClaim,
        signature: Vec<u8>,
    ) -> Result<VoteOutcome, AdapterError> {
        self.check_online()?;
        let mut module = self.module.lock().await;
        Ok(module.submit_vote(orchestrator, claim, &signature)?)
    }

    async fn submit_batch_confirm(
        &self,
        orchestrator: &OrchestratorId,
        token_contract: EthAddress,
        nonce: u64,
        signature: Vec<u8>,
    ) -> Result<BatchStatus, AdapterError> {
        self.check_online()?;
        let mut module = self.module.lock().await;
        Ok(module.submit_batch_confirm(orchestrator, token_contract, nonce, &signature)?)
    }

    async fn mark_batch_submitted(
        &self,
        token_contract: EthAddress,
        nonce: u64,
        tx_hash: &str,
    ) -> Result<(), AdapterError> {
        self.check_online()?;
        let mut module = self.module.lock().await;
        Ok(module.mark_batch_submitted(token_contract, nonce, tx_hash)?)
    }

    async fn query_pending_batches(&self) -> Result<Vec<Batch>, AdapterError> {
        self.check_online()?;
        Ok(self.module.lock().await.pending_batches())
    }

    async fn query_signed_batches(&self) -> Result<Vec<SignedBatch>, AdapterError> {
        self.check_online()?;
        Ok(self.module.lock().await.signed_batches())
    }

    async fn query_batch_confirms(
        &self,
        token_contract: EthAddress,
        nonce: u64,
    ) -> Result<Vec<BatchConfirm>, AdapterError> {
        self.check_online()?;
        Ok(self
            .module
            .lock()
            .await
            .batch_confirms(token_contract, nonce))
    }

    async fn query_outgoing_pool(&self, denom: &str) -> Result<Vec<PoolCandidate>, AdapterError> {
        self.check_online()?;
        Ok(self.module.lock().await.pool_candidates(denom))
    }

    async fn query_balance(&self, account: &str, denom: &str) -> Result<Coin, AdapterError> {
        self.check_online()?;
        Ok(self.module.lock().await.balance(account, denom))
    }

    async fn query_valset(&self) -> Result<ValsetSnapshot, AdapterError> {
        self.check_online()?;
        Ok(self.module.lock().await.valset().clone())
    }

    async fn last_observed_nonce(&self, kind: ClaimKind) -> Result<u64, AdapterError> {
        self.check_online()?;
        Ok(self.module.lock().await.last_observed_nonce(kind))
    }

    async fn query_pending_deployments(&self) -> Result<Vec<DenomMetadata>, AdapterError> {
        self.check_online()?;
        Ok(self.module.lock().await.pending_deployments())
    }

    async fn query_params(&self) -> Result<BridgeParams, AdapterError> {
        self.check_online()?;
        Ok(self.module.lock().await.params().clone())
    }
}
