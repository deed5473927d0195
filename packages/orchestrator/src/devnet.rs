//! Local devnet: one in-process Hilo chain, one simulated Gravity contract
//! and a set of orchestrators with seeded keys.
//!
//! `step` ticks every online orchestrator once and then produces a Hilo
//! block, which makes multi-orchestrator scenarios reproducible.

use eyre::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use hilo_bridge_core::{
    encode_bech32_address, keccak256, Batch, BridgeModule, BridgeParams, Coin, EthAddress,
    OrchestratorId, ValidatorPower, ValsetSnapshot,
};

use crate::cosmos::{CosmosAdapter, LocalCosmosChain};
use crate::ethereum::{EthereumAdapter, SimulatedEthereum};
use crate::error::AdapterError;
use crate::orchestrator::{Orchestrator, SharedStats};
use crate::retry::RetryConfig;
use crate::signer::OrchestratorKey;

/// Voting power every devnet orchestrator gets
pub const DEVNET_POWER: u64 = 100;

/// Seeded key of the `index`-th devnet orchestrator
pub fn devnet_key(index: usize) -> Result<OrchestratorKey> {
    OrchestratorKey::from_seed(
        OrchestratorId::new(format!("hilo-orchestrator-{index}")),
        &format!("hilo-orchestrator-{index}"),
    )
}

/// Deterministic Hilo account derived from a seed string
pub fn hilo_account(seed: &str) -> String {
    let digest = keccak256(seed.as_bytes());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..]);
    // 20 bytes under a constant prefix always encode
    encode_bech32_address(&bytes, hilo_bridge_core::HILO_BECH32_PREFIX).unwrap_or_default()
}

/// Deterministic Ethereum account derived from a seed string
pub fn eth_account(seed: &str) -> EthAddress {
    EthAddress::from_slice(&keccak256(seed.as_bytes())[12..])
}

pub struct Devnet {
    pub cosmos: LocalCosmosChain,
    pub eth: SimulatedEthereum,
    orchestrators: Vec<Orchestrator>,
    online: Vec<bool>,
}

impl Devnet {
    /// Devnet with `orchestrator_count` equally weighted orchestrators
    pub fn new(params: BridgeParams, orchestrator_count: usize, retry: RetryConfig) -> Result<Self> {
        let keys = (0..orchestrator_count)
            .map(devnet_key)
            .collect::<Result<Vec<_>>>()?;
        Self::with_keys(params, keys, retry, Duration::from_millis(1000))
    }

    pub fn with_keys(
        params: BridgeParams,
        keys: Vec<OrchestratorKey>,
        retry: RetryConfig,
        poll_interval: Duration,
    ) -> Result<Self> {
        let valset = ValsetSnapshot::new(
            1,
            keys.iter()
                .map(|k| ValidatorPower {
                    orchestrator: k.id.clone(),
                    eth_address: k.eth_address(),
                    power: DEVNET_POWER,
                })
                .collect(),
        );
        let eth = SimulatedEthereum::new(
            &params.gravity_id,
            valset
                .members
                .iter()
                .map(|m| (m.eth_address, m.power))
                .collect(),
        );

        let mut module = BridgeModule::new(params);
        module.set_valset(valset);
        let cosmos = LocalCosmosChain::new(module);

        let orchestrators: Vec<Orchestrator> = keys
            .into_iter()
            .map(|key| {
                let eth_for_key = Arc::new(eth.connect(key.eth_address()));
                Orchestrator::new(
                    key,
                    Arc::new(cosmos.clone()),
                    eth_for_key,
                    retry.clone(),
                    poll_interval,
                )
            })
            .collect();

        info!(orchestrators = orchestrators.len(), "Devnet created");

        Ok(Self {
            cosmos,
            eth,
            online: vec![true; orchestrators.len()],
            orchestrators,
        })
    }

    pub fn orchestrator_count(&self) -> usize {
        self.orchestrators.len()
    }

    pub fn orchestrator_address(&self, index: usize) -> Option<EthAddress> {
        self.orchestrators.get(index).map(|o| o.key().eth_address())
    }

    /// Hand the orchestrators over to be run as background tasks
    pub fn into_orchestrators(self) -> Vec<Orchestrator> {
        self.orchestrators
    }

    pub fn stats(&self) -> Vec<SharedStats> {
        self.orchestrators.iter().map(Orchestrator::stats).collect()
    }

    /// Take an orchestrator down or bring it back; offline ones skip ticks
    pub fn set_orchestrator_online(&mut self, index: usize, online: bool) {
        if let Some(slot) = self.online.get_mut(index) {
            *slot = online;
        }
    }

    /// Tick every online orchestrator, then finish the current Hilo block
    pub async fn step(&mut self) -> Vec<Batch> {
        for (orchestrator, online) in self.orchestrators.iter_mut().zip(&self.online) {
            if *online {
                orchestrator.tick().await;
            }
        }
        self.cosmos.produce_block().await
    }

    pub async fn run_blocks(&mut self, blocks: usize) {
        for _ in 0..blocks {
            self.step().await;
        }
    }

    /// Step until `done` holds; returns false if it never did within `max_steps`
    pub async fn run_until<F, Fut>(&mut self, max_steps: usize, mut done: F) -> bool
    where
        F: FnMut(LocalCosmosChain, SimulatedEthereum) -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..max_steps {
            if done(self.cosmos.clone(), self.eth.clone()).await {
                return true;
            }
            self.step().await;
        }
        done(self.cosmos.clone(), self.eth.clone()).await
    }

    /// Give a Hilo account genesis funds
    pub async fn fund(&self, account: &str, coin: &Coin) -> Result<()> {
        self.cosmos.with_module(|m| m.fund(account, coin)).await?;
        Ok(())
    }

    /// User deploys the ERC20 for a Hilo denom
    pub async fn deploy_erc20_for_denom(&self, denom: &str) -> Result<EthAddress, AdapterError> {
        let metadata = self.cosmos.with_module(|m| m.denom_metadata(denom)).await;
        self.eth.deploy_erc20(&metadata).await
    }

    /// User locks ERC20 tokens on Ethereum for a Hilo recipient
    pub async fn send_to_cosmos(
        &self,
        from: EthAddress,
        token_contract: EthAddress,
        cosmos_recipient: &str,
        amount: u64,
    ) -> Result<String, AdapterError> {
        self.eth
            .connect(from)
            .send_to_cosmos(token_contract, cosmos_recipient, amount)
            .await
    }

    pub async fn erc20_for(&self, denom: &str) -> Option<EthAddress> {
        self.cosmos.with_module(|m| m.erc20_for(denom)).await
    }

    pub async fn cosmos_balance(&self, account: &str, denom: &str) -> u64 {
        self.cosmos
            .query_balance(account, denom)
            .await
            .map(|coin| coin.amount)
            .unwrap_or(0)
    }

    pub async fn eth_balance(&self, token_contract: EthAddress, account: EthAddress) -> u64 {
        self.eth
            .query_token_balance(token_contract, account)
            .await
            .unwrap_or(0)
    }
}
