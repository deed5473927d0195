//! Batch signer
//!
//! Signs the checkpoint of every pending batch after rebuilding it from this
//! orchestrator's own view of the outgoing pool. A batch that does not match
//! the local rebuild is never signed. An orchestrator outside the current
//! valset, or registered under another Ethereum key, signs nothing.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use hilo_bridge_core::{bytes32_to_hex, verify_batch, BatchStatus, EthAddress};

use crate::cosmos::CosmosAdapter;
use crate::error::AdapterError;
use crate::metrics;
use crate::retry::{with_retry, RetryConfig};
use crate::signer::OrchestratorKey;

/// Outcome counts of one signing pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignPollReport {
    pub signed: usize,
    pub divergent: usize,
}

pub struct BatchSigner {
    key: Arc<OrchestratorKey>,
    cosmos: Arc<dyn CosmosAdapter>,
    retry: RetryConfig,
    /// Batches already confirmed or refused by this orchestrator
    handled: HashSet<(EthAddress, u64)>,
}

impl BatchSigner {
    pub fn new(key: Arc<OrchestratorKey>, cosmos: Arc<dyn CosmosAdapter>, retry: RetryConfig) -> Self {
        Self {
            key,
            cosmos,
            retry,
            handled: HashSet::new(),
        }
    }

    pub async fn poll(&mut self) -> Result<SignPollReport, AdapterError> {
        let orchestrator = self.key.id.as_str().to_string();
        let cosmos = &self.cosmos;
        let mut report = SignPollReport::default();

        let valset = with_retry(&self.retry, "query_valset", || cosmos.query_valset()).await?;
        match valset.member(&self.key.id) {
            Some(member) if member.eth_address == self.key.eth_address() => {}
            Some(member) => {
                warn!(
                    orchestrator = %orchestrator,
                    registered = %member.eth_address,
                    local = %self.key.eth_address(),
                    "Registered Ethereum key differs from local key, not signing batches"
                );
                return Ok(report);
            }
            None => {
                debug!(orchestrator = %orchestrator, epoch = valset.epoch, "Not in valset, not signing batches");
                return Ok(report);
            }
        }

        let params = with_retry(&self.retry, "query_params", || cosmos.query_params()).await?;
        let batches =
            with_retry(&self.retry, "query_pending_batches", || cosmos.query_pending_batches())
                .await?;

        // Forget batches that left the Pending state
        let live: HashSet<(EthAddress, u64)> = batches.iter().map(|b| b.key()).collect();
        self.handled.retain(|key| live.contains(key));

        for batch in batches {
            let key = batch.key();
            if self.handled.contains(&key) {
                continue;
            }

            let confirms = with_retry(&self.retry, "query_batch_confirms", || {
                cosmos.query_batch_confirms(batch.token_contract, batch.nonce)
            })
            .await?;
            if confirms.iter().any(|c| c.orchestrator == self.key.id) {
                self.handled.insert(key);
                continue;
            }

            let pool = with_retry(&self.retry, "query_outgoing_pool", || {
                cosmos.query_outgoing_pool(&batch.denom)
            })
            .await?;

            if let Err(e) = verify_batch(&params.gravity_id, &batch, &pool, params.batch.max_size) {
                warn!(
                    orchestrator = %orchestrator,
                    token = %batch.token_contract,
                    nonce = batch.nonce,
                    error = %e,
                    "Refusing to sign divergent batch"
                );
                metrics::record_batch_divergence(&orchestrator);
                report.divergent += 1;
                self.handled.insert(key);
                continue;
            }

            let signature = self.key.sign_checkpoint(&batch.checkpoint)?;
            let id = &self.key.id;
            let result = with_retry(&self.retry, "submit_batch_confirm", || {
                cosmos.submit_batch_confirm(id, batch.token_contract, batch.nonce, signature.clone())
            })
            .await;

            match result {
                Ok(status) => {
                    info!(
                        orchestrator = %orchestrator,
                        token = %batch.token_contract,
                        nonce = batch.nonce,
                        checkpoint = %bytes32_to_hex(&batch.checkpoint),
                        signed = status == BatchStatus::Signed,
                        "Batch confirmed"
                    );
                    metrics::record_batch_signed(&orchestrator);
                    report.signed += 1;
                    self.handled.insert(key);
                }
                Err(e) if e.is_benign() => {
                    debug!(orchestrator = %orchestrator, nonce = batch.nonce, "Batch already confirmed");
                    self.handled.insert(key);
                }
                Err(AdapterError::Unavailable(reason)) => {
                    return Err(AdapterError::Unavailable(reason));
                }
                Err(e) => {
                    warn!(
                        orchestrator = %orchestrator,
                        token = %batch.token_contract,
                        nonce = batch.nonce,
                        error = %e,
                        "Batch confirm rejected"
                    );
                }
            }
        }

        Ok(report)
    }
}
