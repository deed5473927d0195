//! Ethereum event watcher
//!
//! Reads bridge contract logs block range by block range, buffers the decoded
//! claims per stream and votes on them strictly in event-nonce order. A claim
//! is voted on only once its predecessor is Observed on Hilo, so a lagging
//! orchestrator replays its buffer from the chain's last observed nonce.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use hilo_bridge_core::{ClaimKind, EventClaim, VoteOutcome};

use super::BlockCursor;
use crate::cosmos::CosmosAdapter;
use crate::error::AdapterError;
use crate::ethereum::EthereumAdapter;
use crate::metrics;
use crate::retry::{with_retry, RetryConfig};
use crate::signer::OrchestratorKey;

/// What one poll of the event watcher did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPollReport {
    pub latest_block: u64,
    pub new_events: usize,
    pub malformed_events: usize,
    pub votes_submitted: usize,
    /// Claims buffered but not yet Observed
    pub pending_events: usize,
}

pub struct EventWatcher {
    key: Arc<OrchestratorKey>,
    eth: Arc<dyn EthereumAdapter>,
    cosmos: Arc<dyn CosmosAdapter>,
    cursor: BlockCursor,
    buffer: BTreeMap<ClaimKind, BTreeMap<u64, EventClaim>>,
    /// (stream, nonce) pairs this orchestrator has already voted on
    voted: BTreeSet<(ClaimKind, u64)>,
    retry: RetryConfig,
}

impl EventWatcher {
    pub fn new(
        key: Arc<OrchestratorKey>,
        eth: Arc<dyn EthereumAdapter>,
        cosmos: Arc<dyn CosmosAdapter>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            key,
            eth,
            cosmos,
            cursor: BlockCursor::default(),
            buffer: BTreeMap::new(),
            voted: BTreeSet::new(),
            retry,
        }
    }

    /// Start reading logs after `last_processed` instead of from genesis
    pub fn with_cursor(mut self, last_processed: u64) -> Self {
        self.cursor = BlockCursor::starting_at(last_processed);
        self
    }

    pub fn cursor(&self) -> BlockCursor {
        self.cursor
    }

    fn pending_events(&self) -> usize {
        self.buffer.values().map(BTreeMap::len).sum()
    }

    /// Read new logs, then vote on every claim that is next in its stream
    pub async fn poll(&mut self) -> Result<EventPollReport, AdapterError> {
        let orchestrator = self.key.id.as_str().to_string();
        let mut report = EventPollReport::default();

        let eth = &self.eth;
        let cosmos = &self.cosmos;
        let latest = with_retry(&self.retry, "latest_block", || eth.latest_block()).await?;
        report.latest_block = latest;

        let from_block = self.cursor.next_block();
        if latest >= from_block {
            let logs = with_retry(&self.retry, "query_events", || {
                eth.query_events(from_block, latest)
            })
            .await?;

            debug!(
                orchestrator = %orchestrator,
                from_block,
                to_block = latest,
                logs = logs.len(),
                "Processing Ethereum blocks"
            );

            for log in logs {
                match log.parsed {
                    Ok(claim) => {
                        metrics::record_event_observed(&orchestrator, claim.kind().as_str());
                        self.buffer
                            .entry(claim.kind())
                            .or_default()
                            .insert(claim.event_nonce(), claim);
                        report.new_events += 1;
                    }
                    Err(reason) => {
                        warn!(
                            orchestrator = %orchestrator,
                            block = log.block,
                            log_index = log.log_index,
                            tx_hash = %log.tx_hash,
                            reason = %reason,
                            "Skipping malformed bridge event"
                        );
                        metrics::record_malformed_event(&orchestrator);
                        report.malformed_events += 1;
                    }
                }
            }

            self.cursor.advance(latest);
            metrics::record_block_processed(&orchestrator, latest);
        }

        let params = with_retry(&self.retry, "query_params", || cosmos.query_params()).await?;

        for kind in ClaimKind::ALL {
            let last_observed = with_retry(&self.retry, "last_observed_nonce", || {
                cosmos.last_observed_nonce(kind)
            })
            .await?;

            let stream = self.buffer.entry(kind).or_default();
            stream.retain(|nonce, _| *nonce > last_observed);
            self.voted
                .retain(|(k, nonce)| *k != kind || *nonce > last_observed);

            let mut next = last_observed + 1;
            while let Some(claim) = stream.get(&next).cloned() {
                if self.voted.contains(&(kind, next)) {
                    break;
                }

                let signature = self.key.sign_claim(&claim, params.eth_chain_id)?;
                let id = &self.key.id;
                let result = with_retry(&self.retry, "submit_vote", || {
                    cosmos.submit_vote(id, claim.clone(), signature.clone())
                })
                .await;

                match result {
                    Ok(VoteOutcome::Observed(observed)) => {
                        info!(
                            orchestrator = %orchestrator,
                            claim = %observed,
                            "Claim observed"
                        );
                        metrics::record_vote(&orchestrator, kind.as_str(), true);
                        report.votes_submitted += 1;
                        stream.remove(&next);
                        next += 1;
                    }
                    Ok(VoteOutcome::Recorded {
                        observed_power,
                        required_power,
                    }) => {
                        debug!(
                            orchestrator = %orchestrator,
                            claim = %claim,
                            observed_power,
                            required_power,
                            "Vote recorded"
                        );
                        metrics::record_vote(&orchestrator, kind.as_str(), true);
                        report.votes_submitted += 1;
                        self.voted.insert((kind, next));
                        break;
                    }
                    Err(e) if e.is_benign() => {
                        debug!(orchestrator = %orchestrator, claim = %claim, error = %e, "Vote not needed");
                        self.voted.insert((kind, next));
                        break;
                    }
                    Err(AdapterError::Unavailable(reason)) => {
                        return Err(AdapterError::Unavailable(reason));
                    }
                    Err(e) => {
                        warn!(
                            orchestrator = %orchestrator,
                            claim = %claim,
                            error = %e,
                            "Vote rejected"
                        );
                        metrics::record_vote(&orchestrator, kind.as_str(), false);
                        break;
                    }
                }
            }
        }

        report.pending_events = self.pending_events();
        metrics::set_pending_events(&orchestrator, report.pending_events);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::LocalCosmosChain;
    use crate::ethereum::SimulatedEthereum;
    use hilo_bridge_core::{
        encode_bech32_address, voucher_denom, BridgeModule, BridgeParams, EthAddress,
        ValidatorPower, ValsetSnapshot,
    };

    struct Fixture {
        keys: Vec<Arc<OrchestratorKey>>,
        cosmos: LocalCosmosChain,
        eth: SimulatedEthereum,
    }

    fn fixture() -> Fixture {
        let keys: Vec<Arc<OrchestratorKey>> = (0..3)
            .map(|i| {
                Arc::new(
                    OrchestratorKey::from_seed(
                        format!("orch{i}").as_str().into(),
                        &format!("seed-{i}"),
                    )
                    .unwrap(),
                )
            })
            .collect();
        let params = BridgeParams::default();
        let mut module = BridgeModule::new(params.clone());
        module.set_valset(ValsetSnapshot::new(
            1,
            keys.iter()
                .map(|k| ValidatorPower {
                    orchestrator: k.id.clone(),
                    eth_address: k.eth_address(),
                    power: 100,
                })
                .collect(),
        ));
        let eth = SimulatedEthereum::new(
            &params.gravity_id,
            keys.iter().map(|k| (k.eth_address(), 100)).collect(),
        );
        Fixture {
            keys,
            cosmos: LocalCosmosChain::new(module),
            eth,
        }
    }

    fn watcher(f: &Fixture, i: usize) -> EventWatcher {
        EventWatcher::new(
            f.keys[i].clone(),
            Arc::new(f.eth.connect(f.keys[i].eth_address())),
            Arc::new(f.cosmos.clone()),
            RetryConfig::default(),
        )
    }

    fn recipient() -> String {
        encode_bech32_address(&[7u8; 20], "hilo").unwrap()
    }

    #[tokio::test]
    async fn test_deposit_observed_after_two_thirds_vote() {
        let f = fixture();
        let user = EthAddress::repeat_byte(0x42);
        let user_eth = f.eth.connect(user);
        let token = user_eth.create_token("Tether", "USDT", 6, user, 1_000).await;
        user_eth.send_to_cosmos(token, &recipient(), 250).await.unwrap();

        let mut first = watcher(&f, 0);
        let report = first.poll().await.unwrap();
        assert_eq!(report.new_events, 1);
        assert_eq!(report.votes_submitted, 1);
        assert_eq!(f.cosmos.with_module(|m| m.last_observed_nonce(ClaimKind::Deposit)).await, 0);

        // A second poll must not resubmit the same vote
        assert_eq!(first.poll().await.unwrap().votes_submitted, 0);

        watcher(&f, 1).poll().await.unwrap();
        assert_eq!(f.cosmos.with_module(|m| m.last_observed_nonce(ClaimKind::Deposit)).await, 1);
        let balance = f
            .cosmos
            .with_module(|m| m.balance(&recipient(), &voucher_denom(&token)))
            .await;
        assert_eq!(balance.amount, 250);
    }

    #[tokio::test]
    async fn test_malformed_log_is_skipped() {
        let f = fixture();
        f.eth.inject_malformed_log("bad abi").await;
        let user = EthAddress::repeat_byte(0x42);
        let user_eth = f.eth.connect(user);
        let token = user_eth.create_token("Tether", "USDT", 6, user, 1_000).await;
        user_eth.send_to_cosmos(token, &recipient(), 5).await.unwrap();

        let report = watcher(&f, 0).poll().await.unwrap();
        assert_eq!(report.malformed_events, 1);
        assert_eq!(report.new_events, 1);
        assert_eq!(report.votes_submitted, 1);
    }

    #[tokio::test]
    async fn test_lagging_watcher_skips_observed_claims() {
        let f = fixture();
        let user = EthAddress::repeat_byte(0x42);
        let user_eth = f.eth.connect(user);
        let token = user_eth.create_token("Tether", "USDT", 6, user, 1_000).await;
        user_eth.send_to_cosmos(token, &recipient(), 1).await.unwrap();
        user_eth.send_to_cosmos(token, &recipient(), 2).await.unwrap();

        let mut a = watcher(&f, 0);
        let mut b = watcher(&f, 1);
        a.poll().await.unwrap();
        b.poll().await.unwrap();
        a.poll().await.unwrap();
        assert_eq!(f.cosmos.with_module(|m| m.last_observed_nonce(ClaimKind::Deposit)).await, 2);

        // The third orchestrator replays from genesis; nothing left to vote on
        let report = watcher(&f, 2).poll().await.unwrap();
        assert_eq!(report.new_events, 2);
        assert_eq!(report.votes_submitted, 0);
        assert_eq!(report.pending_events, 0);
    }
}
