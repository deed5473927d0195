//! The Hilo-side bridge module
//!
//! Ties the pool, batch builder, attestation engine and denom registry to a
//! bank ledger. All state transitions are synchronous; callers serialize
//! access (one block at a time).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info, warn};

use crate::address_codec::validate_cosmos_address;
use crate::attestation::{Attestation, AttestationEngine, VoteOutcome};
use crate::bank::Bank;
use crate::batch::{total_fee, Batch, BatchBuilderConfig, PoolCandidate, SignedBatch};
use crate::claims::{BatchExecutedClaim, ClaimKind, DepositClaim, Erc20DeployedClaim, EventClaim};
use crate::crypto::verify_signature;
use crate::error::BridgeError;
use crate::hash::bytes32_to_hex;
use crate::pool::{NewTransfer, OutgoingPool, OutgoingTransfer};
use crate::registry::{DenomMetadata, DenomRegistry, FeeSchedule, TokenOrigin};
use crate::types::{
    BatchStatus, Coin, EthAddress, OrchestratorId, BRIDGE_MODULE_ACCOUNT, COMMUNITY_POOL_ACCOUNT,
    FEE_COLLECTOR_ACCOUNT, HILO_BECH32_PREFIX,
};
use crate::valset::{quorum_reached, ValsetSnapshot};

/// Module parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeParams {
    /// Domain separator signed into every checkpoint
    pub gravity_id: String,
    /// Chain id of the Ethereum network the contract lives on
    pub eth_chain_id: u64,
    pub bech32_prefix: String,
    pub batch: BatchBuilderConfig,
    pub fees: FeeSchedule,
}

impl Default for BridgeParams {
    fn default() -> Self {
        Self {
            gravity_id: "hilo-gravity".to_string(),
            eth_chain_id: 15,
            bech32_prefix: HILO_BECH32_PREFIX.to_string(),
            batch: BatchBuilderConfig::default(),
            fees: FeeSchedule::new(1),
        }
    }
}

/// One orchestrator's signature over a batch checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfirm {
    pub orchestrator: OrchestratorId,
    pub eth_address: EthAddress,
    pub signature: Vec<u8>,
}

type BatchKey = (EthAddress, u64);

#[derive(Debug, Clone)]
pub struct BridgeModule {
    params: BridgeParams,
    height: u64,
    bank: Bank,
    registry: DenomRegistry,
    pool: OutgoingPool,
    batches: BTreeMap<BatchKey, Batch>,
    last_batch_nonce: HashMap<EthAddress, u64>,
    confirms: HashMap<BatchKey, BTreeMap<OrchestratorId, BatchConfirm>>,
    engine: AttestationEngine,
    valset: ValsetSnapshot,
    /// Fees earned by relayers, keyed by (relayer, denom)
    relayer_rewards: BTreeMap<(EthAddress, String), u64>,
}

impl BridgeModule {
    pub fn new(params: BridgeParams) -> Self {
        let engine = AttestationEngine::new(params.eth_chain_id);
        Self {
            params,
            height: 1,
            bank: Bank::new(),
            registry: DenomRegistry::new(),
            pool: OutgoingPool::new(),
            batches: BTreeMap::new(),
            last_batch_nonce: HashMap::new(),
            confirms: HashMap::new(),
            engine,
            valset: ValsetSnapshot::default(),
            relayer_rewards: BTreeMap::new(),
        }
    }

    // ========================================================================
    // Genesis / setup
    // ========================================================================

    pub fn set_valset(&mut self, valset: ValsetSnapshot) {
        info!(
            epoch = valset.epoch,
            members = valset.members.len(),
            total_power = valset.total_power(),
            "Validator set updated"
        );
        self.valset = valset;
    }

    /// Mint coins into an account (genesis allocation)
    pub fn fund(&mut self, account: &str, coin: &Coin) -> Result<(), BridgeError> {
        self.bank.mint(account, &coin.denom, coin.amount)
    }

    pub fn set_denom_metadata(&mut self, metadata: DenomMetadata) {
        self.registry.set_metadata(metadata);
    }

    // ========================================================================
    // User operations
    // ========================================================================

    /// Queue a transfer to Ethereum.
    ///
    /// Debits `amount + bridge_fee + chain_fee` from the sender. The chain
    /// fee goes to the fee collector; the rest is escrowed (Hilo tokens) or
    /// burned (Ethereum vouchers).
    pub fn send_to_eth(
        &mut self,
        sender: &str,
        eth_recipient: EthAddress,
        amount: Coin,
        bridge_fee: Coin,
        chain_fee: Option<Coin>,
    ) -> Result<u64, BridgeError> {
        validate_cosmos_address(sender, &self.params.bech32_prefix)?;

        for fee in std::iter::once(&bridge_fee).chain(chain_fee.as_ref()) {
            if fee.denom != amount.denom {
                return Err(BridgeError::MismatchedFeeDenom {
                    denom: amount.denom.clone(),
                    fee_denom: fee.denom.clone(),
                });
            }
        }

        let request = NewTransfer {
            sender: sender.to_string(),
            eth_recipient,
            denom: amount.denom.clone(),
            amount: amount.amount,
            bridge_fee: bridge_fee.amount,
            chain_fee: chain_fee.map(|c| c.amount).unwrap_or(0),
        };
        request.validate(&self.params.fees)?;

        let total = request.total_cost()?;
        let available = self.bank.balance(sender, &request.denom);
        if available < total {
            return Err(BridgeError::InsufficientFunds {
                account: sender.to_string(),
                denom: request.denom.clone(),
                needed: total,
                available,
            });
        }

        let denom = request.denom.clone();
        let custody = request.amount + request.bridge_fee;
        if request.chain_fee > 0 {
            self.bank
                .transfer(sender, FEE_COLLECTOR_ACCOUNT, &denom, request.chain_fee)?;
        }
        self.bank
            .transfer(sender, BRIDGE_MODULE_ACCOUNT, &denom, custody)?;
        if self.registry.origin(&denom) == TokenOrigin::Ethereum {
            self.bank.burn(BRIDGE_MODULE_ACCOUNT, &denom, custody)?;
        }

        if self.registry.ensure_entry(&denom) {
            info!(denom = %denom, "ERC20 deployment requested");
        }

        let id = self
            .pool
            .enqueue(request, &self.params.fees, self.height)?;

        info!(
            id = id,
            sender = %sender,
            recipient = %eth_recipient,
            amount = %amount,
            bridge_fee = %bridge_fee,
            "Outgoing transfer queued"
        );
        Ok(id)
    }

    /// Cancel a transfer that has not been batched yet.
    ///
    /// Refunds `amount + bridge_fee`; the chain fee is kept.
    pub fn cancel_send_to_eth(&mut self, sender: &str, id: u64) -> Result<Coin, BridgeError> {
        let transfer = self.pool.cancel(id, sender)?;
        let refund = transfer.amount + transfer.bridge_fee;

        match self.registry.origin(&transfer.denom) {
            TokenOrigin::Cosmos => {
                self.bank
                    .transfer(BRIDGE_MODULE_ACCOUNT, sender, &transfer.denom, refund)?
            }
            TokenOrigin::Ethereum => self.bank.mint(sender, &transfer.denom, refund)?,
        }

        info!(id = id, sender = %sender, refund = refund, "Outgoing transfer cancelled");
        Ok(Coin::new(refund, transfer.denom))
    }

    // ========================================================================
    // Orchestrator messages
    // ========================================================================

    /// Record a signed vote for an Ethereum event and apply it on quorum
    pub fn submit_vote(
        &mut self,
        orchestrator: &OrchestratorId,
        claim: EventClaim,
        signature: &[u8],
    ) -> Result<VoteOutcome, BridgeError> {
        let member = self
            .valset
            .member(orchestrator)
            .ok_or_else(|| BridgeError::UnknownOrchestrator(orchestrator.to_string()))?;
        let claim_hash = self.engine.claim_hash(&claim);
        verify_signature(&claim_hash, signature, &member.eth_address)?;

        let outcome = self
            .engine
            .vote(&self.valset, orchestrator, claim, self.height)?;

        if let VoteOutcome::Observed(claim) = &outcome {
            self.apply_claim(claim);
        }
        Ok(outcome)
    }

    /// Record an orchestrator's signature over a batch checkpoint
    pub fn submit_batch_confirm(
        &mut self,
        orchestrator: &OrchestratorId,
        token_contract: EthAddress,
        nonce: u64,
        signature: &[u8],
    ) -> Result<BatchStatus, BridgeError> {
        let member = self
            .valset
            .member(orchestrator)
            .ok_or_else(|| BridgeError::UnknownOrchestrator(orchestrator.to_string()))?;
        let key = (token_contract, nonce);
        let batch = self
            .batches
            .get_mut(&key)
            .filter(|b| b.status.is_open())
            .ok_or(BridgeError::UnknownBatch {
                token: token_contract,
                nonce,
            })?;

        verify_signature(&batch.checkpoint, signature, &member.eth_address)?;

        let confirms = self.confirms.entry(key).or_default();
        if confirms.contains_key(orchestrator) {
            return Err(BridgeError::DuplicateVote {
                orchestrator: orchestrator.clone(),
                claim_hash: bytes32_to_hex(&batch.checkpoint),
            });
        }
        confirms.insert(
            orchestrator.clone(),
            BatchConfirm {
                orchestrator: orchestrator.clone(),
                eth_address: member.eth_address,
                signature: signature.to_vec(),
            },
        );

        let signed_power = self.valset.power_of_set(confirms.keys());
        debug!(
            token = %token_contract,
            nonce = nonce,
            orchestrator = %orchestrator,
            signed_power = signed_power,
            "Batch confirm recorded"
        );

        if batch.status == BatchStatus::Pending
            && quorum_reached(signed_power, self.valset.total_power())
        {
            batch.status = BatchStatus::Signed;
            info!(
                token = %token_contract,
                nonce = nonce,
                signatures = confirms.len(),
                "Batch reached signature quorum"
            );
        }
        Ok(batch.status)
    }

    /// A relayer reports it broadcast a signed batch
    pub fn mark_batch_submitted(
        &mut self,
        token_contract: EthAddress,
        nonce: u64,
        tx_hash: &str,
    ) -> Result<(), BridgeError> {
        let batch = self
            .batches
            .get_mut(&(token_contract, nonce))
            .filter(|b| matches!(b.status, BatchStatus::Signed | BatchStatus::Submitted))
            .ok_or(BridgeError::UnknownBatch {
                token: token_contract,
                nonce,
            })?;
        batch.status = BatchStatus::Submitted;
        batch.submitted_tx = Some(tx_hash.to_string());
        Ok(())
    }

    // ========================================================================
    // Block processing
    // ========================================================================

    /// Finish the current block: time out stalled batches, build due ones,
    /// and advance the height. Returns the batches built.
    pub fn end_block(&mut self) -> Vec<Batch> {
        let height = self.height;
        self.timeout_batches(height);

        let mut built = Vec::new();
        for (denom, pending) in self.pool.pending_denoms() {
            if !self.params.batch.is_due(height, pending) {
                continue;
            }
            match self.build_batch(&denom) {
                Ok(Some(batch)) => built.push(batch),
                Ok(None) => {}
                Err(BridgeError::UnmappedDenom(denom)) => {
                    debug!(denom = %denom, "Batch deferred until ERC20 is deployed");
                }
                Err(e) => error!(denom = %denom, error = %e, "Failed to build batch"),
            }
        }

        self.height += 1;
        built
    }

    /// Build a batch for `denom` from the current pool, if worthwhile.
    ///
    /// Returns `None` when the pool is empty or the candidate batch does not
    /// pay more than an already open batch for the same token.
    pub fn build_batch(&mut self, denom: &str) -> Result<Option<Batch>, BridgeError> {
        let token = self
            .registry
            .erc20_for(denom)
            .ok_or_else(|| BridgeError::UnmappedDenom(denom.to_string()))?;

        let max_size = self.params.batch.max_size;
        let candidates = self.pool.peek_for_batch(denom, max_size);
        if candidates.is_empty() {
            return Ok(None);
        }
        let candidate_fee = total_fee(&candidates)?;

        let best_open = self
            .batches_for(token)
            .filter(|b| b.status.is_open())
            .map(|b| b.total_fee)
            .max();
        if let Some(best_open) = best_open {
            if candidate_fee <= best_open {
                debug!(
                    denom = %denom,
                    candidate_fee = candidate_fee,
                    best_open = best_open,
                    "Skipping batch that does not beat open batches"
                );
                return Ok(None);
            }
        }

        let selected = self.pool.dequeue_for_batch(denom, max_size);
        let nonce = self.last_batch_nonce.get(&token).copied().unwrap_or(0) + 1;
        self.last_batch_nonce.insert(token, nonce);

        let batch = Batch::build(
            &self.params.gravity_id,
            token,
            denom,
            nonce,
            selected,
            self.height,
        )?;
        info!(
            denom = %denom,
            token = %token,
            nonce = nonce,
            transfers = batch.transfers.len(),
            total_fee = batch.total_fee,
            checkpoint = %bytes32_to_hex(&batch.checkpoint),
            "Batch built"
        );
        self.batches.insert(batch.key(), batch.clone());
        Ok(Some(batch))
    }

    fn timeout_batches(&mut self, height: u64) {
        let config = &self.params.batch;
        let expired: Vec<BatchKey> = self
            .batches
            .values()
            .filter(|b| b.status == BatchStatus::Pending && config.is_expired(b.created_at, height))
            .map(Batch::key)
            .collect();

        for key in expired {
            warn!(
                token = %key.0,
                nonce = key.1,
                "Batch timed out without signature quorum"
            );
            self.retire_batch(key, height);
        }
    }

    fn retire_batch(&mut self, key: BatchKey, height: u64) {
        if let Some(batch) = self.batches.get_mut(&key) {
            batch.status = BatchStatus::TimedOut;
            let ids = batch.transfer_ids();
            self.pool.return_to_pending(&ids, height);
        }
        self.confirms.remove(&key);
    }

    // ========================================================================
    // Claim effects
    // ========================================================================

    fn apply_claim(&mut self, claim: &EventClaim) {
        match claim {
            EventClaim::Deposit(c) => self.apply_deposit(c),
            EventClaim::BatchExecuted(c) => self.apply_batch_executed(c),
            EventClaim::Erc20Deployed(c) => self.apply_erc20_deployed(c),
        }
    }

    fn apply_deposit(&mut self, claim: &DepositClaim) {
        let denom = self.registry.denom_for_deposit(claim.token_contract);
        let recipient =
            match validate_cosmos_address(&claim.cosmos_recipient, &self.params.bech32_prefix) {
                Ok(()) => claim.cosmos_recipient.as_str(),
                Err(e) => {
                    warn!(
                        nonce = claim.event_nonce,
                        recipient = %claim.cosmos_recipient,
                        error = %e,
                        "Deposit recipient invalid, crediting community pool"
                    );
                    COMMUNITY_POOL_ACCOUNT
                }
            };

        let result = match self.registry.origin(&denom) {
            TokenOrigin::Cosmos => {
                self.bank
                    .transfer(BRIDGE_MODULE_ACCOUNT, recipient, &denom, claim.amount)
            }
            TokenOrigin::Ethereum => self.bank.mint(recipient, &denom, claim.amount),
        };

        match result {
            Ok(()) => info!(
                nonce = claim.event_nonce,
                recipient = %recipient,
                amount = claim.amount,
                denom = %denom,
                "Deposit applied"
            ),
            Err(e) => error!(nonce = claim.event_nonce, error = %e, "Failed to apply deposit"),
        }
    }

    fn apply_batch_executed(&mut self, claim: &BatchExecutedClaim) {
        let key = (claim.token_contract, claim.batch_nonce);
        let Some(batch) = self.batches.get_mut(&key).filter(|b| b.status.is_open()) else {
            warn!(
                token = %claim.token_contract,
                nonce = claim.batch_nonce,
                "Executed batch is unknown or already closed"
            );
            return;
        };

        batch.status = BatchStatus::Executed;
        let ids = batch.transfer_ids();
        let denom = batch.denom.clone();
        let fee = batch.total_fee;
        self.pool.confirm(&ids);
        self.confirms.remove(&key);

        if let Err(e) = self.credit_relayer(claim.relayer, &denom, fee) {
            error!(relayer = %claim.relayer, denom = %denom, error = %e, "Failed to credit relayer");
        }

        info!(
            token = %claim.token_contract,
            nonce = claim.batch_nonce,
            transfers = ids.len(),
            relayer = %claim.relayer,
            fee = fee,
            denom = %denom,
            "Batch executed"
        );

        // Ethereum rejects nonces at or below the last executed one
        let superseded: Vec<BatchKey> = self
            .batches
            .range((claim.token_contract, 0)..(claim.token_contract, claim.batch_nonce))
            .filter(|(_, b)| b.status.is_open())
            .map(|(k, _)| *k)
            .collect();
        for key in superseded {
            info!(token = %key.0, nonce = key.1, "Batch superseded by later execution");
            self.retire_batch(key, self.height);
        }
    }

    fn credit_relayer(
        &mut self,
        relayer: EthAddress,
        denom: &str,
        fee: u64,
    ) -> Result<(), BridgeError> {
        let reward = self
            .relayer_rewards
            .entry((relayer, denom.to_string()))
            .or_insert(0);
        *reward = reward.checked_add(fee).ok_or(BridgeError::Overflow)?;
        Ok(())
    }

    fn apply_erc20_deployed(&mut self, claim: &Erc20DeployedClaim) {
        let metadata = DenomMetadata {
            denom: claim.denom.clone(),
            name: claim.name.clone(),
            symbol: claim.symbol.clone(),
            decimals: claim.decimals,
        };
        match self.registry.register_erc20(&metadata, claim.token_contract) {
            Ok(()) => info!(
                denom = %claim.denom,
                contract = %claim.token_contract,
                "ERC20 registered"
            ),
            Err(e) => warn!(
                denom = %claim.denom,
                contract = %claim.token_contract,
                error = %e,
                "Ignoring ERC20 deployment"
            ),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn params(&self) -> &BridgeParams {
        &self.params
    }

    pub fn valset(&self) -> &ValsetSnapshot {
        &self.valset
    }

    pub fn balance(&self, account: &str, denom: &str) -> Coin {
        Coin::new(self.bank.balance(account, denom), denom)
    }

    pub fn balances(&self, account: &str) -> Vec<Coin> {
        self.bank
            .balances(account)
            .into_iter()
            .map(|(denom, amount)| Coin::new(amount, denom))
            .collect()
    }

    pub fn supply(&self, denom: &str) -> u64 {
        self.bank.supply(denom)
    }

    /// Pending transfers for a denom
    pub fn outgoing_pool(&self, denom: &str) -> Vec<OutgoingTransfer> {
        self.pool.pending(denom)
    }

    pub fn outgoing_transfer(&self, id: u64) -> Option<&OutgoingTransfer> {
        self.pool.get(id)
    }

    /// Pending transfers of a denom with their eligibility heights
    pub fn pool_candidates(&self, denom: &str) -> Vec<PoolCandidate> {
        self.pool
            .pending(denom)
            .iter()
            .map(OutgoingTransfer::to_candidate)
            .collect()
    }

    /// Batches still collecting signatures
    pub fn pending_batches(&self) -> Vec<Batch> {
        self.batches
            .values()
            .filter(|b| b.status == BatchStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn batch(&self, token_contract: EthAddress, nonce: u64) -> Option<&Batch> {
        self.batches.get(&(token_contract, nonce))
    }

    pub fn batches_for(&self, token_contract: EthAddress) -> impl Iterator<Item = &Batch> {
        self.batches
            .range((token_contract, 0)..=(token_contract, u64::MAX))
            .map(|(_, b)| b)
    }

    pub fn batch_confirms(&self, token_contract: EthAddress, nonce: u64) -> Vec<BatchConfirm> {
        self.confirms
            .get(&(token_contract, nonce))
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Batches with signature quorum that are not executed yet, with their
    /// signatures in validator-set order
    pub fn signed_batches(&self) -> Vec<SignedBatch> {
        self.batches
            .values()
            .filter(|b| matches!(b.status, BatchStatus::Signed | BatchStatus::Submitted))
            .map(|batch| {
                let confirms = self.confirms.get(&batch.key());
                let signatures = self
                    .valset
                    .members
                    .iter()
                    .filter_map(|m| confirms.and_then(|c| c.get(&m.orchestrator)))
                    .map(|c| (c.eth_address, c.signature.clone()))
                    .collect();
                SignedBatch {
                    batch: batch.clone(),
                    signatures,
                }
            })
            .collect()
    }

    pub fn last_batch_nonce(&self, token_contract: EthAddress) -> u64 {
        self.last_batch_nonce
            .get(&token_contract)
            .copied()
            .unwrap_or(0)
    }

    pub fn last_observed_nonce(&self, kind: ClaimKind) -> u64 {
        self.engine.last_observed_nonce(kind)
    }

    pub fn attestation(&self, claim: &EventClaim) -> Option<&Attestation> {
        self.engine.attestation(&self.engine.claim_hash(claim))
    }

    pub fn pending_deployments(&self) -> Vec<DenomMetadata> {
        self.registry.pending_deployments()
    }

    pub fn denom_metadata(&self, denom: &str) -> DenomMetadata {
        self.registry.metadata(denom)
    }

    pub fn registry(&self) -> &DenomRegistry {
        &self.registry
    }

    pub fn erc20_for(&self, denom: &str) -> Option<EthAddress> {
        self.registry.erc20_for(denom)
    }

    pub fn relayer_rewards(&self, relayer: EthAddress, denom: &str) -> u64 {
        self.relayer_rewards
            .get(&(relayer, denom.to_string()))
            .copied()
            .unwrap_or(0)
    }
}
