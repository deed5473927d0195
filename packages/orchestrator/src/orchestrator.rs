//! One orchestrator: event watcher, batch signer, relayer and ERC20 deployer
//!
//! `tick` runs every worker once in a fixed order, which the devnet and the
//! integration tests use to step the system deterministically. `run` spawns
//! the workers as independent tasks that poll on their own schedule.

use chrono::{DateTime, Utc};
use eyre::{eyre, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

use hilo_bridge_core::EthAddress;

use crate::cosmos::CosmosAdapter;
use crate::error::AdapterError;
use crate::ethereum::EthereumAdapter;
use crate::relayer::{BatchRelayer, Erc20Deployer};
use crate::retry::RetryConfig;
use crate::signer::OrchestratorKey;
use crate::watchers::{BatchSigner, EventPollReport, EventWatcher};

/// Orchestrator statistics shared between workers and the HTTP server
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStats {
    pub orchestrator_id: String,
    pub eth_address: EthAddress,
    pub last_eth_block: u64,
    pub events_seen: u64,
    pub malformed_events: u64,
    pub votes_submitted: u64,
    pub pending_events: usize,
    pub batches_signed: u64,
    pub batch_divergences: u64,
    pub batches_relayed: u64,
    pub erc20_deployments: u64,
    pub adapter_errors: u64,
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrchestratorStats {
    fn new(key: &OrchestratorKey) -> Self {
        Self {
            orchestrator_id: key.id.as_str().to_string(),
            eth_address: key.eth_address(),
            last_eth_block: 0,
            events_seen: 0,
            malformed_events: 0,
            votes_submitted: 0,
            pending_events: 0,
            batches_signed: 0,
            batch_divergences: 0,
            batches_relayed: 0,
            erc20_deployments: 0,
            adapter_errors: 0,
            last_error: None,
            updated_at: None,
        }
    }

    fn record_events(&mut self, report: &EventPollReport) {
        self.last_eth_block = report.latest_block;
        self.events_seen += report.new_events as u64;
        self.malformed_events += report.malformed_events as u64;
        self.votes_submitted += report.votes_submitted as u64;
        self.pending_events = report.pending_events;
        self.updated_at = Some(Utc::now());
    }

    fn record_error(&mut self, worker: &str, error: &AdapterError) {
        self.adapter_errors += 1;
        self.last_error = Some(format!("{worker}: {error}"));
        self.updated_at = Some(Utc::now());
    }
}

pub type SharedStats = Arc<RwLock<OrchestratorStats>>;

/// What one `tick` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub votes_submitted: usize,
    pub batches_signed: usize,
    pub batches_relayed: usize,
    pub erc20_deployments: usize,
    pub errors: usize,
}

pub struct Orchestrator {
    key: Arc<OrchestratorKey>,
    events: EventWatcher,
    signer: BatchSigner,
    relayer: BatchRelayer,
    deployer: Erc20Deployer,
    stats: SharedStats,
    poll_interval: Duration,
}

impl Orchestrator {
    /// `eth` must be bound to this orchestrator's own Ethereum account
    pub fn new(
        key: OrchestratorKey,
        cosmos: Arc<dyn CosmosAdapter>,
        eth: Arc<dyn EthereumAdapter>,
        retry: RetryConfig,
        poll_interval: Duration,
    ) -> Self {
        let key = Arc::new(key);
        let id = key.id.as_str().to_string();
        let stats = Arc::new(RwLock::new(OrchestratorStats::new(&key)));

        Self {
            events: EventWatcher::new(key.clone(), eth.clone(), cosmos.clone(), retry.clone()),
            signer: BatchSigner::new(key.clone(), cosmos.clone(), retry.clone()),
            relayer: BatchRelayer::new(&id, eth.clone(), cosmos.clone(), retry.clone()),
            deployer: Erc20Deployer::new(&id, eth, cosmos, retry),
            key,
            stats,
            poll_interval,
        }
    }

    pub fn key(&self) -> &OrchestratorKey {
        &self.key
    }

    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }

    /// Run every worker once: attest, sign, deploy, relay
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        match self.events.poll().await {
            Ok(events) => {
                report.votes_submitted = events.votes_submitted;
                self.stats.write().await.record_events(&events);
            }
            Err(e) => {
                report.errors += 1;
                self.log_error("events", &e).await;
            }
        }

        match self.signer.poll().await {
            Ok(signed) => {
                report.batches_signed = signed.signed;
                let mut stats = self.stats.write().await;
                stats.batches_signed += signed.signed as u64;
                stats.batch_divergences += signed.divergent as u64;
            }
            Err(e) => {
                report.errors += 1;
                self.log_error("batch_signer", &e).await;
            }
        }

        match self.deployer.poll().await {
            Ok(deployed) => {
                report.erc20_deployments = deployed;
                self.stats.write().await.erc20_deployments += deployed as u64;
            }
            Err(e) => {
                report.errors += 1;
                self.log_error("erc20_deployer", &e).await;
            }
        }

        match self.relayer.poll().await {
            Ok(relayed) => {
                report.batches_relayed = relayed;
                self.stats.write().await.batches_relayed += relayed as u64;
            }
            Err(e) => {
                report.errors += 1;
                self.log_error("relayer", &e).await;
            }
        }

        report
    }

    async fn log_error(&self, worker: &str, error: &AdapterError) {
        warn!(
            orchestrator = %self.key.id,
            worker = worker,
            error = %error,
            "Worker poll failed; will retry next interval"
        );
        self.stats.write().await.record_error(worker, error);
    }

    /// Run the workers concurrently until shutdown.
    /// Returns when a worker task fails or the shutdown signal is received.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let Orchestrator {
            key,
            mut events,
            mut signer,
            mut relayer,
            mut deployer,
            stats,
            poll_interval,
        } = self;

        info!(
            orchestrator = %key.id,
            eth_address = %key.eth_address(),
            poll_interval_ms = poll_interval.as_millis() as u64,
            "Orchestrator started"
        );

        let mut join_set = tokio::task::JoinSet::new();

        // Ethereum watcher
        {
            let stats = stats.clone();
            join_set.spawn(async move {
                loop {
                    match events.poll().await {
                        Ok(report) => stats.write().await.record_events(&report),
                        Err(e) => {
                            warn!(worker = "events", error = %e, "Event poll failed");
                            stats.write().await.record_error("events", &e);
                        }
                    }
                    tokio::time::sleep(poll_interval).await;
                }
            });
        }

        // Hilo-side batch signer
        {
            let stats = stats.clone();
            join_set.spawn(async move {
                loop {
                    match signer.poll().await {
                        Ok(report) => {
                            let mut stats = stats.write().await;
                            stats.batches_signed += report.signed as u64;
                            stats.batch_divergences += report.divergent as u64;
                        }
                        Err(e) => {
                            warn!(worker = "batch_signer", error = %e, "Batch signer poll failed");
                            stats.write().await.record_error("batch_signer", &e);
                        }
                    }
                    tokio::time::sleep(poll_interval).await;
                }
            });
        }

        // Ethereum-bound submissions
        {
            let stats = stats.clone();
            join_set.spawn(async move {
                loop {
                    match deployer.poll().await {
                        Ok(n) => stats.write().await.erc20_deployments += n as u64,
                        Err(e) => stats.write().await.record_error("erc20_deployer", &e),
                    }
                    match relayer.poll().await {
                        Ok(n) => stats.write().await.batches_relayed += n as u64,
                        Err(e) => {
                            warn!(worker = "relayer", error = %e, "Relayer poll failed");
                            stats.write().await.record_error("relayer", &e);
                        }
                    }
                    tokio::time::sleep(poll_interval).await;
                }
            });
        }

        tokio::select! {
            _ = shutdown.recv() => {
                info!(orchestrator = %key.id, "Shutdown signal received, stopping workers");
                join_set.abort_all();
                Ok(())
            }
            maybe_done = join_set.join_next() => {
                match maybe_done {
                    Some(Ok(())) => {
                        error!(orchestrator = %key.id, "A worker exited unexpectedly");
                        Err(eyre!("worker exited unexpectedly"))
                    }
                    Some(Err(e)) => {
                        error!(orchestrator = %key.id, "A worker task panicked: {:?}", e);
                        Err(eyre!("worker task panicked: {}", e))
                    }
                    None => {
                        error!(orchestrator = %key.id, "All worker tasks exited unexpectedly");
                        Err(eyre!("all worker tasks exited unexpectedly"))
                    }
                }
            }
        }
    }
}
