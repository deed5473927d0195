//! Ethereum-bound workers: batch relaying and lazy ERC20 deployment

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use hilo_bridge_core::{BatchStatus, EthAddress};

use crate::cosmos::CosmosAdapter;
use crate::error::AdapterError;
use crate::ethereum::EthereumAdapter;
use crate::metrics;
use crate::retry::{classify_error, with_retry, ErrorClass, RetryConfig};

/// Submits batches that reached signature quorum to the Gravity contract.
///
/// Any orchestrator may relay; the contract pays the batch fee to whoever
/// gets the transaction in first.
pub struct BatchRelayer {
    orchestrator: String,
    eth: Arc<dyn EthereumAdapter>,
    cosmos: Arc<dyn CosmosAdapter>,
    retry: RetryConfig,
    /// Batches this orchestrator got executed
    relayed: HashSet<(EthAddress, u64)>,
}

impl BatchRelayer {
    pub fn new(
        orchestrator: &str,
        eth: Arc<dyn EthereumAdapter>,
        cosmos: Arc<dyn CosmosAdapter>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            orchestrator: orchestrator.to_string(),
            eth,
            cosmos,
            retry,
            relayed: HashSet::new(),
        }
    }

    pub fn relayed(&self) -> &HashSet<(EthAddress, u64)> {
        &self.relayed
    }

    /// Relay every signed batch Ethereum has not executed yet; returns how
    /// many this call submitted
    pub async fn poll(&mut self) -> Result<usize, AdapterError> {
        let eth = &self.eth;
        let cosmos = &self.cosmos;
        let signed =
            with_retry(&self.retry, "query_signed_batches", || cosmos.query_signed_batches())
                .await?;

        let mut submitted = 0;
        for signed_batch in signed {
            let batch = &signed_batch.batch;
            if batch.status != BatchStatus::Signed {
                continue;
            }

            let executed = with_retry(&self.retry, "last_batch_nonce", || {
                eth.last_batch_nonce(batch.token_contract)
            })
            .await?;
            if executed >= batch.nonce {
                debug!(
                    orchestrator = %self.orchestrator,
                    token = %batch.token_contract,
                    nonce = batch.nonce,
                    executed,
                    "Batch already executed or superseded on Ethereum"
                );
                continue;
            }

            // A revert is final; only node failures are retried
            match with_retry(&self.retry, "submit_batch", || eth.submit_batch(&signed_batch)).await
            {
                Ok(tx_hash) => {
                    info!(
                        orchestrator = %self.orchestrator,
                        token = %batch.token_contract,
                        nonce = batch.nonce,
                        tx_hash = %tx_hash,
                        "Batch relayed"
                    );
                    metrics::record_batch_relayed(&self.orchestrator, true);
                    self.relayed.insert(batch.key());
                    submitted += 1;

                    if let Err(e) = with_retry(&self.retry, "mark_batch_submitted", || {
                        cosmos.mark_batch_submitted(batch.token_contract, batch.nonce, &tx_hash)
                    })
                    .await
                    {
                        warn!(nonce = batch.nonce, error = %e, "Failed to report batch submission");
                    }
                }
                Err(e) if classify_error(&e) == ErrorClass::AlreadyDone => {
                    debug!(
                        orchestrator = %self.orchestrator,
                        nonce = batch.nonce,
                        error = %e,
                        "Batch relayed by someone else"
                    );
                }
                Err(AdapterError::Unavailable(reason)) => {
                    metrics::record_batch_relayed(&self.orchestrator, false);
                    return Err(AdapterError::Unavailable(reason));
                }
                Err(e) => {
                    warn!(
                        orchestrator = %self.orchestrator,
                        token = %batch.token_contract,
                        nonce = batch.nonce,
                        error = %e,
                        "Batch submission failed"
                    );
                    metrics::record_batch_relayed(&self.orchestrator, false);
                }
            }
        }

        Ok(submitted)
    }
}

/// Deploys the ERC20 for every Hilo denom that was bridged before it had one
pub struct Erc20Deployer {
    orchestrator: String,
    eth: Arc<dyn EthereumAdapter>,
    cosmos: Arc<dyn CosmosAdapter>,
    retry: RetryConfig,
    /// Denoms deployed by this orchestrator and awaiting attestation
    requested: HashSet<String>,
}

impl Erc20Deployer {
    pub fn new(
        orchestrator: &str,
        eth: Arc<dyn EthereumAdapter>,
        cosmos: Arc<dyn CosmosAdapter>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            orchestrator: orchestrator.to_string(),
            eth,
            cosmos,
            retry,
            requested: HashSet::new(),
        }
    }

    /// Returns how many deployments this call performed
    pub async fn poll(&mut self) -> Result<usize, AdapterError> {
        let eth = &self.eth;
        let cosmos = &self.cosmos;
        let pending = with_retry(&self.retry, "query_pending_deployments", || {
            cosmos.query_pending_deployments()
        })
        .await?;

        let waiting: HashSet<&str> = pending.iter().map(|m| m.denom.as_str()).collect();
        self.requested.retain(|denom| waiting.contains(denom.as_str()));

        let mut deployed = 0;
        for metadata in &pending {
            if self.requested.contains(&metadata.denom) {
                continue;
            }

            match with_retry(&self.retry, "deploy_erc20", || eth.deploy_erc20(metadata)).await {
                Ok(token) => {
                    info!(
                        orchestrator = %self.orchestrator,
                        denom = %metadata.denom,
                        token = %token,
                        "ERC20 deployment submitted"
                    );
                    metrics::record_erc20_deployment(&self.orchestrator);
                    self.requested.insert(metadata.denom.clone());
                    deployed += 1;
                }
                Err(AdapterError::Unavailable(reason)) => {
                    return Err(AdapterError::Unavailable(reason));
                }
                Err(e) => {
                    warn!(
                        orchestrator = %self.orchestrator,
                        denom = %metadata.denom,
                        error = %e,
                        "ERC20 deployment failed"
                    );
                }
            }
        }

        Ok(deployed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::LocalCosmosChain;
    use crate::ethereum::SimulatedEthereum;
    use hilo_bridge_core::{encode_bech32_address, BridgeModule, BridgeParams, Coin};

    #[tokio::test]
    async fn test_deployer_deploys_pending_denom_once() {
        let params = BridgeParams::default();
        let mut module = BridgeModule::new(params.clone());
        let sender = encode_bech32_address(&[1u8; 20], "hilo").unwrap();
        module.fund(&sender, &Coin::new(1_000, "uhilo")).unwrap();
        module
            .send_to_eth(
                &sender,
                EthAddress::repeat_byte(0x99),
                Coin::new(100, "uhilo"),
                Coin::new(5, "uhilo"),
                None,
            )
            .unwrap();
        let cosmos = LocalCosmosChain::new(module);
        let eth = SimulatedEthereum::new(&params.gravity_id, vec![]);

        let mut deployer = Erc20Deployer::new(
            "orch0",
            Arc::new(eth.connect(EthAddress::repeat_byte(1))),
            Arc::new(cosmos.clone()),
            RetryConfig::default(),
        );
        assert_eq!(deployer.poll().await.unwrap(), 1);
        // Still pending on Hilo until the deployment event is attested
        assert_eq!(deployer.poll().await.unwrap(), 0);
        assert!(eth.erc20_for_denom("uhilo").await.is_some());
    }

    #[tokio::test]
    async fn test_relayer_skips_unsigned_batches() {
        let params = BridgeParams::default();
        let cosmos = LocalCosmosChain::new(BridgeModule::new(params.clone()));
        let eth = SimulatedEthereum::new(&params.gravity_id, vec![]);
        let mut relayer = BatchRelayer::new(
            "orch0",
            Arc::new(eth.connect(EthAddress::repeat_byte(1))),
            Arc::new(cosmos),
            RetryConfig::default(),
        );
        assert_eq!(relayer.poll().await.unwrap(), 0);
        assert!(relayer.relayed().is_empty());
    }
}
