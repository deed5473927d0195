//! In-process Gravity contract
//!
//! Implements the contract rules the bridge relies on: per-type event
//! nonces, batch nonce monotonicity per token, 2/3 signature power over the
//! batch checkpoint and fee payout to the submitter. `deployERC20` always
//! deploys a fresh token unless the latest one for the denom already carries
//! the same metadata, so a bad first deployment cannot claim a denom. Every
//! transaction mines one block.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use hilo_bridge_core::{
    batch_checkpoint, bytes32_to_hex, keccak256, quorum_reached, recover_signer,
    BatchExecutedClaim, ClaimKind, DenomMetadata, DepositClaim, Erc20DeployedClaim, EthAddress,
    EventClaim, SignedBatch,
};

use super::{EthereumAdapter, EventLog};
use crate::error::AdapterError;

#[derive(Debug, Clone)]
struct Erc20 {
    name: String,
    symbol: String,
    decimals: u8,
    balances: HashMap<EthAddress, u128>,
}

#[derive(Debug)]
struct GravityState {
    gravity_id: String,
    bridge_address: EthAddress,
    valset: Vec<(EthAddress, u64)>,
    block: u64,
    tx_count: u64,
    tokens: HashMap<EthAddress, Erc20>,
    denom_tokens: HashMap<String, EthAddress>,
    last_batch_nonce: HashMap<EthAddress, u64>,
    event_nonces: BTreeMap<ClaimKind, u64>,
    logs: Vec<EventLog>,
}

impl GravityState {
    /// Mine a block carrying one transaction; returns (block, tx hash)
    fn mine_tx(&mut self) -> (u64, String) {
        self.block += 1;
        self.tx_count += 1;
        let mut seed = self.tx_count.to_be_bytes().to_vec();
        seed.extend_from_slice(self.bridge_address.as_slice());
        (self.block, bytes32_to_hex(&keccak256(&seed)))
    }

    fn next_event_nonce(&mut self, kind: ClaimKind) -> u64 {
        let nonce = self.event_nonces.entry(kind).or_insert(0);
        *nonce += 1;
        *nonce
    }

    fn emit(&mut self, block: u64, tx_hash: &str, parsed: Result<EventClaim, String>) {
        let log_index = self.logs.iter().filter(|l| l.block == block).count() as u64;
        self.logs.push(EventLog {
            block,
            log_index,
            tx_hash: tx_hash.to_string(),
            parsed,
        });
    }

    fn token_mut(&mut self, token: &EthAddress) -> Result<&mut Erc20, AdapterError> {
        self.tokens
            .get_mut(token)
            .ok_or_else(|| AdapterError::Reverted(format!("unknown token {token}")))
    }

    fn move_tokens(
        &mut self,
        token: &EthAddress,
        from: EthAddress,
        to: EthAddress,
        amount: u128,
    ) -> Result<(), AdapterError> {
        let erc20 = self.token_mut(token)?;
        let from_balance = erc20.balances.get(&from).copied().unwrap_or(0);
        if from_balance < amount {
            return Err(AdapterError::Reverted(format!(
                "ERC20: transfer amount exceeds balance ({from_balance} < {amount})"
            )));
        }
        erc20.balances.insert(from, from_balance - amount);
        *erc20.balances.entry(to).or_insert(0) += amount;
        Ok(())
    }

    /// Latest ERC20 deployed for `metadata.denom`, if its metadata matches
    fn matching_deployment(&self, metadata: &DenomMetadata) -> Option<EthAddress> {
        let address = self.denom_tokens.get(&metadata.denom)?;
        self.tokens
            .get(address)
            .filter(|t| {
                t.name == metadata.name
                    && t.symbol == metadata.symbol
                    && t.decimals == metadata.decimals
            })
            .map(|_| *address)
    }

    fn new_token_address(&self, salt: &str) -> EthAddress {
        let mut seed = self.bridge_address.to_vec();
        seed.extend_from_slice(salt.as_bytes());
        seed.extend_from_slice(&(self.tokens.len() as u64).to_be_bytes());
        EthAddress::from_slice(&keccak256(&seed)[12..])
    }
}

/// Handle to the simulated Ethereum chain, bound to one sending account
#[derive(Clone)]
pub struct SimulatedEthereum {
    state: Arc<Mutex<GravityState>>,
    online: Arc<AtomicBool>,
    sender: EthAddress,
}

impl SimulatedEthereum {
    /// Deploy a Gravity contract whose signer set is `valset` (address, power)
    pub fn new(gravity_id: &str, valset: Vec<(EthAddress, u64)>) -> Self {
        let bridge_address = EthAddress::from_slice(&keccak256(gravity_id.as_bytes())[12..]);
        let state = GravityState {
            gravity_id: gravity_id.to_string(),
            bridge_address,
            valset,
            block: 0,
            tx_count: 0,
            tokens: HashMap::new(),
            denom_tokens: HashMap::new(),
            last_batch_nonce: HashMap::new(),
            event_nonces: BTreeMap::new(),
            logs: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            online: Arc::new(AtomicBool::new(true)),
            sender: EthAddress::ZERO,
        }
    }

    /// Same chain, different sending account
    pub fn connect(&self, sender: EthAddress) -> Self {
        Self {
            state: self.state.clone(),
            online: self.online.clone(),
            sender,
        }
    }

    pub async fn bridge_address(&self) -> EthAddress {
        self.state.lock().await.bridge_address
    }

    /// Simulate the RPC endpoint going away
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), AdapterError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AdapterError::Unavailable("ethereum rpc unreachable".to_string()))
        }
    }

    /// Deploy an Ethereum-native ERC20 and mint its supply to `holder`
    pub async fn create_token(
        &self,
        name: &str,
        symbol: &str,
        decimals: u8,
        holder: EthAddress,
        supply: u128,
    ) -> EthAddress {
        let mut state = self.state.lock().await;
        state.mine_tx();
        let address = state.new_token_address(symbol);
        state.tokens.insert(
            address,
            Erc20 {
                name: name.to_string(),
                symbol: symbol.to_string(),
                decimals,
                balances: HashMap::from([(holder, supply)]),
            },
        );
        address
    }

    /// Emit a log the watcher cannot decode
    pub async fn inject_malformed_log(&self, reason: &str) {
        let mut state = self.state.lock().await;
        let (block, tx_hash) = state.mine_tx();
        state.emit(block, &tx_hash, Err(reason.to_string()));
    }

    /// Advance one empty block
    pub async fn mine(&self) {
        self.state.lock().await.block += 1;
    }

    pub async fn token_metadata(&self, token: EthAddress) -> Option<(String, String, u8)> {
        let state = self.state.lock().await;
        state
            .tokens
            .get(&token)
            .map(|t| (t.name.clone(), t.symbol.clone(), t.decimals))
    }

    /// Latest ERC20 deployed for a denom
    pub async fn erc20_for_denom(&self, denom: &str) -> Option<EthAddress> {
        self.state.lock().await.denom_tokens.get(denom).copied()
    }
}

#[async_trait]
impl EthereumAdapter for SimulatedEthereum {
    fn sender(&self) -> EthAddress {
        self.sender
    }

    async fn latest_block(&self) -> Result<u64, AdapterError> {
        self.check_online()?;
        Ok(self.state.lock().await.block)
    }

    async fn query_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EventLog>, AdapterError> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state
            .logs
            .iter()
            .filter(|l| l.block >= from_block && l.block <= to_block)
            .cloned()
            .collect())
    }

    async fn submit_batch(&self, signed: &SignedBatch) -> Result<String, AdapterError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let batch = &signed.batch;
        let token = batch.token_contract;

        if !state.tokens.contains_key(&token) {
            return Err(AdapterError::Reverted(format!("unknown token {token}")));
        }
        let last = state.last_batch_nonce.get(&token).copied().unwrap_or(0);
        if batch.nonce <= last {
            return Err(AdapterError::Reverted(format!(
                "batch nonce not greater than last executed ({} <= {last})",
                batch.nonce
            )));
        }

        // The contract only trusts what it can recompute from calldata
        let checkpoint =
            batch_checkpoint(&state.gravity_id, &token, batch.nonce, &batch.transfers);
        let mut seen = HashSet::new();
        let mut signed_power = 0u64;
        for (claimed, signature) in &signed.signatures {
            let signer = recover_signer(&checkpoint, signature)
                .map_err(|e| AdapterError::Reverted(e.to_string()))?;
            if &signer != claimed {
                return Err(AdapterError::Reverted(format!(
                    "invalid signature from {claimed}"
                )));
            }
            if !seen.insert(signer) {
                continue;
            }
            if let Some((_, power)) = state.valset.iter().find(|(a, _)| *a == signer) {
                signed_power += power;
            }
        }
        let total_power: u64 = state.valset.iter().map(|(_, p)| p).sum();
        if !quorum_reached(signed_power, total_power) {
            return Err(AdapterError::Reverted(format!(
                "insufficient signature power ({signed_power} of {total_power})"
            )));
        }

        let required: u128 = batch
            .transfers
            .iter()
            .map(|t| t.amount as u128 + t.bridge_fee as u128)
            .sum();
        let bridge = state.bridge_address;
        let available = state
            .token_mut(&token)?
            .balances
            .get(&bridge)
            .copied()
            .unwrap_or(0);
        if available < required {
            return Err(AdapterError::Reverted(format!(
                "bridge balance too low ({available} < {required})"
            )));
        }

        for transfer in &batch.transfers {
            state.move_tokens(&token, bridge, transfer.eth_recipient, transfer.amount as u128)?;
        }
        state.move_tokens(&token, bridge, self.sender, batch.total_fee as u128)?;
        state.last_batch_nonce.insert(token, batch.nonce);

        let (block, tx_hash) = state.mine_tx();
        let event_nonce = state.next_event_nonce(ClaimKind::BatchExecuted);
        state.emit(
            block,
            &tx_hash,
            Ok(EventClaim::BatchExecuted(BatchExecutedClaim {
                event_nonce,
                eth_block: block,
                token_contract: token,
                batch_nonce: batch.nonce,
                relayer: self.sender,
            })),
        );

        info!(
            token = %token,
            nonce = batch.nonce,
            relayer = %self.sender,
            transfers = batch.transfers.len(),
            tx_hash = %tx_hash,
            "Batch executed on Ethereum"
        );
        Ok(tx_hash)
    }

    async fn last_batch_nonce(&self, token_contract: EthAddress) -> Result<u64, AdapterError> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state
            .last_batch_nonce
            .get(&token_contract)
            .copied()
            .unwrap_or(0))
    }

    async fn deploy_erc20(&self, metadata: &DenomMetadata) -> Result<EthAddress, AdapterError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        if let Some(existing) = state.matching_deployment(metadata) {
            debug!(denom = %metadata.denom, token = %existing, "ERC20 already deployed");
            return Ok(existing);
        }

        let address = state.new_token_address(&metadata.denom);
        let bridge = state.bridge_address;
        // The bridge holds the entire supply; batches release it
        state.tokens.insert(
            address,
            Erc20 {
                name: metadata.name.clone(),
                symbol: metadata.symbol.clone(),
                decimals: metadata.decimals,
                balances: HashMap::from([(bridge, u64::MAX as u128)]),
            },
        );
        state.denom_tokens.insert(metadata.denom.clone(), address);

        let (block, tx_hash) = state.mine_tx();
        let event_nonce = state.next_event_nonce(ClaimKind::Erc20Deployed);
        state.emit(
            block,
            &tx_hash,
            Ok(EventClaim::Erc20Deployed(Erc20DeployedClaim {
                event_nonce,
                eth_block: block,
                denom: metadata.denom.clone(),
                token_contract: address,
                name: metadata.name.clone(),
                symbol: metadata.symbol.clone(),
                decimals: metadata.decimals,
            })),
        );

        info!(denom = %metadata.denom, token = %address, "ERC20 deployed");
        Ok(address)
    }

    async fn query_token_balance(
        &self,
        token_contract: EthAddress,
        account: EthAddress,
    ) -> Result<u64, AdapterError> {
        self.check_online()?;
        let state = self.state.lock().await;
        let balance = state
            .tokens
            .get(&token_contract)
            .and_then(|t| t.balances.get(&account))
            .copied()
            .unwrap_or(0);
        Ok(u64::try_from(balance).unwrap_or(u64::MAX))
    }

    async fn send_to_cosmos(
        &self,
        token_contract: EthAddress,
        cosmos_recipient: &str,
        amount: u64,
    ) -> Result<String, AdapterError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let bridge = state.bridge_address;
        state.move_tokens(&token_contract, self.sender, bridge, amount as u128)?;

        let (block, tx_hash) = state.mine_tx();
        let event_nonce = state.next_event_nonce(ClaimKind::Deposit);
        state.emit(
            block,
            &tx_hash,
            Ok(EventClaim::Deposit(DepositClaim {
                event_nonce,
                eth_block: block,
                token_contract,
                eth_sender: self.sender,
                cosmos_recipient: cosmos_recipient.to_string(),
                amount,
            })),
        );

        debug!(
            token = %token_contract,
            sender = %self.sender,
            recipient = %cosmos_recipient,
            amount = amount,
            "sendToCosmos"
        );
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::OrchestratorKey;
    use hilo_bridge_core::{Batch, BatchTransfer};

    const GRAVITY_ID: &str = "hilo-test";

    fn keys(n: usize) -> Vec<OrchestratorKey> {
        (0..n)
            .map(|i| OrchestratorKey::from_seed(format!("val{i}").as_str().into(), &format!("seed-{i}")).unwrap())
            .collect()
    }

    fn chain(keys: &[OrchestratorKey]) -> SimulatedEthereum {
        SimulatedEthereum::new(
            GRAVITY_ID,
            keys.iter().map(|k| (k.eth_address(), 100)).collect(),
        )
    }

    fn signed(batch: Batch, keys: &[OrchestratorKey]) -> SignedBatch {
        let signatures = keys
            .iter()
            .map(|k| (k.eth_address(), k.sign_checkpoint(&batch.checkpoint).unwrap()))
            .collect();
        SignedBatch { batch, signatures }
    }

    fn batch(token: EthAddress, nonce: u64, recipient: EthAddress) -> Batch {
        Batch::build(
            GRAVITY_ID,
            token,
            "uhilo",
            nonce,
            vec![BatchTransfer {
                id: nonce,
                sender: "hilo1sender".to_string(),
                eth_recipient: recipient,
                amount: 300,
                bridge_fee: 7,
            }],
            1,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_deploy_is_idempotent_per_denom() {
        let keys = keys(3);
        let eth = chain(&keys).connect(keys[0].eth_address());
        let meta = DenomMetadata::default_for("uhilo");

        let first = eth.deploy_erc20(&meta).await.unwrap();
        let second = eth.deploy_erc20(&meta).await.unwrap();
        assert_eq!(first, second);

        let logs = eth.query_events(0, u64::MAX).await.unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn test_deploy_with_other_metadata_creates_new_token() {
        let keys = keys(3);
        let chain = chain(&keys);
        let squatter = chain.connect(EthAddress::repeat_byte(0x66));
        let honest = chain.connect(keys[0].eth_address());
        let meta = DenomMetadata::default_for("photon");
        let bad = DenomMetadata {
            name: "Not Photon".to_string(),
            decimals: 2,
            ..meta.clone()
        };

        let squatted = squatter.deploy_erc20(&bad).await.unwrap();
        let token = honest.deploy_erc20(&meta).await.unwrap();
        assert_ne!(squatted, token);
        assert_eq!(chain.erc20_for_denom("photon").await, Some(token));
        assert_eq!(
            chain.token_metadata(token).await,
            Some((meta.name.clone(), meta.symbol.clone(), meta.decimals))
        );

        // Both deployments are visible to the watchers
        let deployed: Vec<EthAddress> = honest
            .query_events(0, u64::MAX)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|l| match l.parsed {
                Ok(EventClaim::Erc20Deployed(c)) => Some(c.token_contract),
                _ => None,
            })
            .collect();
        assert_eq!(deployed, vec![squatted, token]);

        // A repeat of the honest deployment reuses the token
        assert_eq!(honest.deploy_erc20(&meta).await.unwrap(), token);
    }

    #[tokio::test]
    async fn test_batch_pays_recipient_and_relayer() {
        let keys = keys(3);
        let relayer = keys[2].eth_address();
        let eth = chain(&keys).connect(relayer);
        let token = eth.deploy_erc20(&DenomMetadata::default_for("uhilo")).await.unwrap();
        let recipient = EthAddress::repeat_byte(0x99);

        eth.submit_batch(&signed(batch(token, 1, recipient), &keys[..2]))
            .await
            .unwrap();

        assert_eq!(eth.query_token_balance(token, recipient).await.unwrap(), 300);
        assert_eq!(eth.query_token_balance(token, relayer).await.unwrap(), 7);
        assert_eq!(eth.last_batch_nonce(token).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_rejected_without_quorum_or_replayed() {
        let keys = keys(3);
        let eth = chain(&keys).connect(keys[0].eth_address());
        let token = eth.deploy_erc20(&DenomMetadata::default_for("uhilo")).await.unwrap();
        let recipient = EthAddress::repeat_byte(0x99);

        let err = eth
            .submit_batch(&signed(batch(token, 1, recipient), &keys[..1]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("insufficient signature power"));

        eth.submit_batch(&signed(batch(token, 2, recipient), &keys))
            .await
            .unwrap();
        let err = eth
            .submit_batch(&signed(batch(token, 1, recipient), &keys))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Reverted(_)));
    }

    #[tokio::test]
    async fn test_send_to_cosmos_emits_sequential_deposits() {
        let keys = keys(1);
        let user = EthAddress::repeat_byte(0x55);
        let eth = chain(&keys).connect(user);
        let token = eth.create_token("Test", "TST", 18, user, 1_000).await;

        eth.send_to_cosmos(token, "hilo1recipient", 10).await.unwrap();
        eth.send_to_cosmos(token, "hilo1recipient", 20).await.unwrap();

        let nonces: Vec<u64> = eth
            .query_events(0, u64::MAX)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|l| l.parsed.ok())
            .map(|c| c.event_nonce())
            .collect();
        assert_eq!(nonces, vec![1, 2]);
        assert_eq!(eth.query_token_balance(token, user).await.unwrap(), 970);

        let err = eth.send_to_cosmos(token, "hilo1recipient", 10_000).await.unwrap_err();
        assert!(matches!(err, AdapterError::Reverted(_)));
    }

    #[tokio::test]
    async fn test_offline_rpc_is_unavailable() {
        let eth = chain(&keys(1));
        eth.set_online(false);
        assert!(matches!(
            eth.latest_block().await,
            Err(AdapterError::Unavailable(_))
        ));
    }
}
