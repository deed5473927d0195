//! Hilo Bridge Orchestrator Node
//!
//! Runs every configured orchestrator against an in-process Hilo chain and
//! either a live Ethereum node (`ETH_RPC_URL`) or the simulated Gravity
//! contract.

use std::sync::Arc;

use eyre::{eyre, Result};
use tokio::sync::mpsc;
use tracing::{error, info};

use hilo_bridge_core::{BridgeModule, OrchestratorId, ValidatorPower, ValsetSnapshot};
use orchestrator::config::{Config, LogFormat};
use orchestrator::cosmos::LocalCosmosChain;
use orchestrator::devnet::{devnet_key, Devnet, DEVNET_POWER};
use orchestrator::ethereum::EvmClient;
use orchestrator::{api, metrics, Orchestrator, OrchestratorKey};

fn main() -> Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let config = Config::load()?;
    init_logging(config.api.log_format);

    info!("Starting Hilo Bridge Orchestrator");
    info!(
        gravity_id = %config.bridge.gravity_id,
        eth_chain_id = config.ethereum.chain_id,
        live_ethereum = config.ethereum.rpc_url.is_some(),
        "Configuration loaded"
    );

    let keys = load_keys(&config)?;
    let (cosmos, orchestrators) = match &config.ethereum.rpc_url {
        Some(rpc_url) => live_orchestrators(&config, rpc_url, keys)?,
        None => {
            let devnet = Devnet::with_keys(
                config.bridge_params(),
                keys,
                config.retry_config(),
                config.poll_interval(),
            )?;
            info!(
                bridge = %devnet.eth.bridge_address().await,
                "Using simulated Ethereum"
            );
            let cosmos = devnet.cosmos.clone();
            (cosmos, devnet.into_orchestrators())
        }
    };

    let stats = orchestrators.iter().map(Orchestrator::stats).collect();
    metrics::UP.set(1.0);

    // One shutdown channel per long-running task
    let mut shutdown_senders = Vec::new();
    let mut join_set = tokio::task::JoinSet::new();

    for orchestrator in orchestrators {
        let (tx, rx) = mpsc::channel::<()>(1);
        shutdown_senders.push(tx);
        join_set.spawn(async move { orchestrator.run(rx).await });
    }

    let (block_tx, mut block_rx) = mpsc::channel::<()>(1);
    shutdown_senders.push(block_tx);
    let block_interval = config.block_interval();
    join_set.spawn(async move {
        loop {
            tokio::select! {
                _ = block_rx.recv() => return Ok(()),
                _ = tokio::time::sleep(block_interval) => {
                    cosmos.produce_block().await;
                }
            }
        }
    });

    let bind_address = config.api.bind_address.clone();
    let port = config.api.port;
    tokio::spawn(async move {
        if let Err(e) = api::start_server(&bind_address, port, stats).await {
            error!(error = %e, "API server error");
        }
    });

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        for tx in shutdown_senders {
            let _ = tx.send(()).await;
        }
    });

    while let Some(result) = join_set.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Task stopped with error"),
            Err(e) => error!(error = %e, "Task panicked"),
        }
    }

    metrics::UP.set(0.0);
    info!("Hilo Bridge Orchestrator stopped");
    Ok(())
}

/// Configured keys, or seeded devnet keys when none are given
fn load_keys(config: &Config) -> Result<Vec<OrchestratorKey>> {
    if config.ethereum.private_keys.is_empty() {
        return (0..config.orchestrator.count).map(devnet_key).collect();
    }
    config
        .ethereum
        .private_keys
        .iter()
        .enumerate()
        .map(|(i, key)| {
            OrchestratorKey::from_hex(OrchestratorId::new(format!("hilo-orchestrator-{i}")), key)
        })
        .collect()
}

fn live_orchestrators(
    config: &Config,
    rpc_url: &str,
    keys: Vec<OrchestratorKey>,
) -> Result<(LocalCosmosChain, Vec<Orchestrator>)> {
    let bridge_address = config
        .ethereum
        .bridge_address
        .as_deref()
        .ok_or_else(|| eyre!("ETH_BRIDGE_ADDRESS required with ETH_RPC_URL"))?;

    let mut module = BridgeModule::new(config.bridge_params());
    module.set_valset(ValsetSnapshot::new(
        1,
        keys.iter()
            .map(|k| ValidatorPower {
                orchestrator: k.id.clone(),
                eth_address: k.eth_address(),
                power: DEVNET_POWER,
            })
            .collect(),
    ));
    let cosmos = LocalCosmosChain::new(module);

    let orchestrators = keys
        .into_iter()
        .map(|key| {
            let eth = EvmClient::new(rpc_url, bridge_address, key.signer().clone())?;
            Ok(Orchestrator::new(
                key,
                Arc::new(cosmos.clone()),
                Arc::new(eth),
                config.retry_config(),
                config.poll_interval(),
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((cosmos, orchestrators))
}

fn init_logging(format: LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,orchestrator=debug,hilo_orchestrator=debug"));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init(),
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
