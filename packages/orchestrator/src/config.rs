//! Orchestrator configuration

use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use hilo_bridge_core::{BatchBuilderConfig, BridgeParams, FeeSchedule, HILO_BECH32_PREFIX};

use crate::retry::RetryConfig;

/// Main configuration for the orchestrator node
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub ethereum: EthereumConfig,
    pub orchestrator: OrchestratorConfig,
    pub api: ApiConfig,
}

/// Parameters of the Hilo bridge module
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_gravity_id")]
    pub gravity_id: String,
    #[serde(default = "default_batch_max_size")]
    pub batch_max_size: usize,
    #[serde(default = "default_batch_interval_blocks")]
    pub batch_interval_blocks: u64,
    #[serde(default = "default_batch_timeout_blocks")]
    pub batch_timeout_blocks: u64,
    #[serde(default = "default_min_bridge_fee")]
    pub default_min_bridge_fee: u64,
    /// Per-denom minimum bridge fees
    #[serde(default)]
    pub min_bridge_fees: Vec<(String, u64)>,
    /// Hilo block time
    #[serde(default = "default_block_interval")]
    pub block_interval_ms: u64,
}

/// Ethereum connection. Without an RPC URL the node runs against the
/// in-process simulated contract.
#[derive(Clone, Deserialize)]
pub struct EthereumConfig {
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub bridge_address: Option<String>,
    #[serde(default = "default_eth_chain_id")]
    pub chain_id: u64,
    /// One key per orchestrator, 0x-prefixed hex
    #[serde(default)]
    pub private_keys: Vec<String>,
}

/// Custom Debug that redacts private keys
impl fmt::Debug for EthereumConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthereumConfig")
            .field("rpc_url", &self.rpc_url)
            .field("bridge_address", &self.bridge_address)
            .field("chain_id", &self.chain_id)
            .field(
                "private_keys",
                &format!("<{} redacted>", self.private_keys.len()),
            )
            .finish()
    }
}

/// Orchestrator loop settings
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Orchestrators to run when no keys are configured (seeded keys)
    #[serde(default = "default_orchestrator_count")]
    pub count: usize,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_initial_backoff")]
    pub retry_initial_backoff_ms: u64,
    #[serde(default = "default_retry_max_backoff")]
    pub retry_max_backoff_ms: u64,
}

/// HTTP API and log output
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_gravity_id() -> String {
    "hilo-gravity".to_string()
}

fn default_batch_max_size() -> usize {
    100
}

fn default_batch_interval_blocks() -> u64 {
    10
}

fn default_batch_timeout_blocks() -> u64 {
    100
}

fn default_min_bridge_fee() -> u64 {
    1
}

fn default_block_interval() -> u64 {
    1000
}

fn default_eth_chain_id() -> u64 {
    15
}

fn default_orchestrator_count() -> usize {
    3
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_initial_backoff() -> u64 {
    200
}

fn default_retry_max_backoff() -> u64 {
    10_000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    9092
}

/// Parse `denom=amount,denom=amount`
pub fn parse_min_bridge_fees(raw: &str) -> Result<Vec<(String, u64)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (denom, amount) = entry
                .split_once('=')
                .ok_or_else(|| eyre!("MIN_BRIDGE_FEES entry '{}' must be denom=amount", entry))?;
            let amount = amount
                .trim()
                .parse()
                .wrap_err_with(|| format!("Invalid minimum fee for {}", denom))?;
            Ok((denom.trim().to_string(), amount))
        })
        .collect()
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    fn load_from_env() -> Result<Self> {
        let min_bridge_fees = match env::var("MIN_BRIDGE_FEES") {
            Ok(raw) => parse_min_bridge_fees(&raw)?,
            Err(_) => Vec::new(),
        };

        let bridge = BridgeConfig {
            gravity_id: env::var("GRAVITY_ID").unwrap_or_else(|_| default_gravity_id()),
            batch_max_size: env_or("BATCH_MAX_SIZE", default_batch_max_size()),
            batch_interval_blocks: env_or("BATCH_INTERVAL_BLOCKS", default_batch_interval_blocks()),
            batch_timeout_blocks: env_or("BATCH_TIMEOUT_BLOCKS", default_batch_timeout_blocks()),
            default_min_bridge_fee: env_or("DEFAULT_MIN_BRIDGE_FEE", default_min_bridge_fee()),
            min_bridge_fees,
            block_interval_ms: env_or("BLOCK_INTERVAL_MS", default_block_interval()),
        };

        let ethereum = EthereumConfig {
            rpc_url: env::var("ETH_RPC_URL").ok().filter(|s| !s.is_empty()),
            bridge_address: env::var("ETH_BRIDGE_ADDRESS").ok().filter(|s| !s.is_empty()),
            chain_id: env_or("ETH_CHAIN_ID", default_eth_chain_id()),
            private_keys: env::var("ETH_PRIVATE_KEYS")
                .map(|raw| {
                    raw.split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };

        let orchestrator = OrchestratorConfig {
            count: env_or("ORCHESTRATOR_COUNT", default_orchestrator_count()),
            poll_interval_ms: env_or("POLL_INTERVAL_MS", default_poll_interval()),
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", default_retry_attempts()),
            retry_initial_backoff_ms: env_or(
                "RETRY_INITIAL_BACKOFF_MS",
                default_retry_initial_backoff(),
            ),
            retry_max_backoff_ms: env_or("RETRY_MAX_BACKOFF_MS", default_retry_max_backoff()),
        };

        let api = ApiConfig {
            bind_address: env::var("API_BIND_ADDRESS").unwrap_or_else(|_| default_bind_address()),
            port: env_or("API_PORT", default_api_port()),
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let config = Config {
            bridge,
            ethereum,
            orchestrator,
            api,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.bridge.gravity_id.is_empty() {
            return Err(eyre!("bridge.gravity_id cannot be empty"));
        }
        if self.bridge.batch_max_size == 0 {
            return Err(eyre!("bridge.batch_max_size must be at least 1"));
        }
        if self.bridge.batch_interval_blocks == 0 {
            return Err(eyre!("bridge.batch_interval_blocks must be at least 1"));
        }
        if self.bridge.batch_timeout_blocks == 0 {
            return Err(eyre!("bridge.batch_timeout_blocks must be at least 1"));
        }

        if self.ethereum.rpc_url.is_some() {
            match &self.ethereum.bridge_address {
                Some(addr) if addr.len() == 42 && addr.starts_with("0x") => {}
                _ => {
                    return Err(eyre!(
                        "ethereum.bridge_address must be a valid hex address (42 chars with 0x prefix) when ETH_RPC_URL is set"
                    ))
                }
            }
            if self.ethereum.private_keys.is_empty() {
                return Err(eyre!("ETH_PRIVATE_KEYS is required when ETH_RPC_URL is set"));
            }
        }

        for key in &self.ethereum.private_keys {
            if key.len() != 66 || !key.starts_with("0x") {
                return Err(eyre!(
                    "ethereum.private_keys entries must be 66 chars (0x + 64 hex chars)"
                ));
            }
        }

        if self.ethereum.private_keys.is_empty() && self.orchestrator.count == 0 {
            return Err(eyre!("orchestrator.count must be at least 1"));
        }

        if self.orchestrator.retry_initial_backoff_ms > self.orchestrator.retry_max_backoff_ms {
            return Err(eyre!(
                "orchestrator.retry_initial_backoff_ms cannot exceed retry_max_backoff_ms"
            ));
        }

        Ok(())
    }

    /// Bridge module parameters derived from this configuration
    pub fn bridge_params(&self) -> BridgeParams {
        let fees = self
            .bridge
            .min_bridge_fees
            .iter()
            .fold(FeeSchedule::new(self.bridge.default_min_bridge_fee), |fees, (denom, min)| {
                fees.with_minimum(denom.clone(), *min)
            });

        BridgeParams {
            gravity_id: self.bridge.gravity_id.clone(),
            eth_chain_id: self.ethereum.chain_id,
            bech32_prefix: HILO_BECH32_PREFIX.to_string(),
            batch: BatchBuilderConfig {
                max_size: self.bridge.batch_max_size,
                interval_blocks: self.bridge.batch_interval_blocks,
                timeout_blocks: self.bridge.batch_timeout_blocks,
            },
            fees,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.orchestrator.retry_max_attempts,
            initial_backoff: Duration::from_millis(self.orchestrator.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.orchestrator.retry_max_backoff_ms),
            ..RetryConfig::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.orchestrator.poll_interval_ms)
    }

    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.bridge.block_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            bridge: BridgeConfig {
                gravity_id: default_gravity_id(),
                batch_max_size: default_batch_max_size(),
                batch_interval_blocks: default_batch_interval_blocks(),
                batch_timeout_blocks: default_batch_timeout_blocks(),
                default_min_bridge_fee: default_min_bridge_fee(),
                min_bridge_fees: vec![],
                block_interval_ms: default_block_interval(),
            },
            ethereum: EthereumConfig {
                rpc_url: None,
                bridge_address: None,
                chain_id: default_eth_chain_id(),
                private_keys: vec![],
            },
            orchestrator: OrchestratorConfig {
                count: default_orchestrator_count(),
                poll_interval_ms: default_poll_interval(),
                retry_max_attempts: default_retry_attempts(),
                retry_initial_backoff_ms: default_retry_initial_backoff(),
                retry_max_backoff_ms: default_retry_max_backoff(),
            },
            api: ApiConfig {
                bind_address: default_bind_address(),
                port: default_api_port(),
                log_format: LogFormat::Pretty,
            },
        }
    }

    #[test]
    fn test_devnet_defaults_are_valid() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_parse_min_bridge_fees() {
        let fees = parse_min_bridge_fees("uhilo=7, photon=3,").unwrap();
        assert_eq!(
            fees,
            vec![("uhilo".to_string(), 7), ("photon".to_string(), 3)]
        );
        assert!(parse_min_bridge_fees("uhilo").is_err());
        assert!(parse_min_bridge_fees("uhilo=abc").is_err());
    }

    #[test]
    fn test_bridge_params_carry_fee_floors() {
        let mut config = base_config();
        config.bridge.min_bridge_fees = vec![("uhilo".to_string(), 7)];
        let params = config.bridge_params();
        assert_eq!(params.fees.minimum_bridge_fee("uhilo"), 7);
        assert_eq!(params.fees.minimum_bridge_fee("photon"), 1);
        assert_eq!(params.gravity_id, "hilo-gravity");
    }

    #[test]
    fn test_live_ethereum_requires_address_and_keys() {
        let mut config = base_config();
        config.ethereum.rpc_url = Some("http://localhost:8545".to_string());
        assert!(config.validate().is_err());

        config.ethereum.bridge_address = Some(format!("0x{}", "ab".repeat(20)));
        assert!(config.validate().is_err());

        config.ethereum.private_keys = vec![format!("0x{}", "11".repeat(32))];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_batch_size_validation() {
        let mut config = base_config();
        config.bridge.batch_max_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_private_keys() {
        let mut config = base_config();
        config.ethereum.private_keys = vec![format!("0x{}", "11".repeat(32))];
        let debug = format!("{:?}", config.ethereum);
        assert!(!debug.contains("1111"));
        assert!(debug.contains("redacted"));
    }
}
