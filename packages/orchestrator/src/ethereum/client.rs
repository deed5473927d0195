//! Ethereum adapter backed by a JSON-RPC node
//!
//! Uses Alloy's `ProviderBuilder::with_recommended_fillers()` so nonce, gas
//! limit and fee fields are populated for every transaction. Providers are
//! built per call; the client only holds the URL, contract address and key.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolEvent;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use std::fmt::Display;
use std::str::FromStr;
use tracing::{debug, info, warn};

use hilo_bridge_core::{
    BatchExecutedClaim, DenomMetadata, DepositClaim, Erc20DeployedClaim, EthAddress, EventClaim,
    SignedBatch,
};

use super::contract::{Gravity, IERC20};
use super::{EthereumAdapter, EventLog};
use crate::error::AdapterError;

/// Ethereum client bound to one bridge contract and one sending key
pub struct EvmClient {
    rpc_url: String,
    bridge_address: Address,
    signer: PrivateKeySigner,
}

/// Map a provider or contract error; reverts are final, the rest is retried
fn call_error(context: &str, e: impl Display) -> AdapterError {
    let message = format!("{context}: {e}");
    if message.to_lowercase().contains("revert") {
        AdapterError::Reverted(message)
    } else {
        AdapterError::Unavailable(message)
    }
}

fn to_u64(value: U256, field: &str) -> Result<u64, String> {
    u64::try_from(value).map_err(|_| format!("{field} does not fit in u64: {value}"))
}

/// Decode one bridge contract log into a claim
fn decode_log(log: &Log) -> Result<EventClaim, String> {
    let topic0 = log
        .topics()
        .first()
        .copied()
        .ok_or_else(|| "log without topics".to_string())?;
    let eth_block = log.block_number.unwrap_or_default();

    if topic0 == Gravity::SendToCosmosEvent::SIGNATURE_HASH {
        let event = log
            .log_decode::<Gravity::SendToCosmosEvent>()
            .map_err(|e| e.to_string())?
            .inner
            .data;
        Ok(EventClaim::Deposit(DepositClaim {
            event_nonce: to_u64(event.eventNonce, "eventNonce")?,
            eth_block,
            token_contract: event.tokenContract,
            eth_sender: event.sender,
            cosmos_recipient: event.destination,
            amount: to_u64(event.amount, "amount")?,
        }))
    } else if topic0 == Gravity::TransactionBatchExecutedEvent::SIGNATURE_HASH {
        let event = log
            .log_decode::<Gravity::TransactionBatchExecutedEvent>()
            .map_err(|e| e.to_string())?
            .inner
            .data;
        Ok(EventClaim::BatchExecuted(BatchExecutedClaim {
            event_nonce: to_u64(event.eventNonce, "eventNonce")?,
            eth_block,
            token_contract: event.token,
            batch_nonce: to_u64(event.batchNonce, "batchNonce")?,
            relayer: event.relayer,
        }))
    } else if topic0 == Gravity::ERC20DeployedEvent::SIGNATURE_HASH {
        let event = log
            .log_decode::<Gravity::ERC20DeployedEvent>()
            .map_err(|e| e.to_string())?
            .inner
            .data;
        Ok(EventClaim::Erc20Deployed(Erc20DeployedClaim {
            event_nonce: to_u64(event.eventNonce, "eventNonce")?,
            eth_block,
            denom: event.cosmosDenom,
            token_contract: event.tokenContract,
            name: event.name,
            symbol: event.symbol,
            decimals: event.decimals,
        }))
    } else {
        Err(format!("unknown event signature {topic0}"))
    }
}

/// Token announced by the `ERC20DeployedEvent` for `denom` among receipt logs
fn deployed_token(logs: &[Log], denom: &str) -> Option<Address> {
    logs.iter()
        .filter_map(|log| log.log_decode::<Gravity::ERC20DeployedEvent>().ok())
        .map(|log| log.inner.data)
        .find(|event| event.cosmosDenom == denom)
        .map(|event| event.tokenContract)
}

impl EvmClient {
    /// Create a new EVM client
    pub fn new(rpc_url: &str, bridge_address: &str, signer: PrivateKeySigner) -> Result<Self> {
        let bridge_address =
            Address::from_str(bridge_address).wrap_err("Invalid bridge address")?;

        info!(
            sender = %signer.address(),
            bridge = %bridge_address,
            "EVM client initialized"
        );

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            bridge_address,
            signer,
        })
    }

    fn read_provider(&self) -> Result<RootProvider<Http<Client>>, AdapterError> {
        let url = self
            .rpc_url
            .parse()
            .map_err(|e| AdapterError::Unavailable(format!("Invalid RPC URL: {e}")))?;
        Ok(ProviderBuilder::new().on_http(url))
    }

    fn wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }

    async fn erc20_for_denom(&self, denom: &str) -> Result<Option<Address>, AdapterError> {
        let provider = self.read_provider()?;
        let contract = Gravity::new(self.bridge_address, &provider);
        let token = contract
            .denomToERC20(denom.to_string())
            .call()
            .await
            .map_err(|e| call_error("denomToERC20", e))?
            .token;
        Ok((token != Address::ZERO).then_some(token))
    }

    /// Whether a deployed token carries exactly this metadata
    async fn token_matches(
        &self,
        token: Address,
        metadata: &DenomMetadata,
    ) -> Result<bool, AdapterError> {
        let provider = self.read_provider()?;
        let erc20 = IERC20::new(token, &provider);
        let name = erc20
            .name()
            .call()
            .await
            .map_err(|e| call_error("name", e))?
            .tokenName;
        let symbol = erc20
            .symbol()
            .call()
            .await
            .map_err(|e| call_error("symbol", e))?
            .tokenSymbol;
        let decimals = erc20
            .decimals()
            .call()
            .await
            .map_err(|e| call_error("decimals", e))?
            .tokenDecimals;
        Ok(name == metadata.name && symbol == metadata.symbol && decimals == metadata.decimals)
    }
}

#[async_trait]
impl EthereumAdapter for EvmClient {
    fn sender(&self) -> EthAddress {
        self.signer.address()
    }

    async fn latest_block(&self) -> Result<u64, AdapterError> {
        self.read_provider()?
            .get_block_number()
            .await
            .map_err(|e| call_error("Failed to get block number", e))
    }

    async fn query_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EventLog>, AdapterError> {
        let filter = Filter::new()
            .address(self.bridge_address)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .read_provider()?
            .get_logs(&filter)
            .await
            .map_err(|e| call_error("Failed to get logs", e))?;

        Ok(logs
            .iter()
            .map(|log| EventLog {
                block: log.block_number.unwrap_or_default(),
                log_index: log.log_index.unwrap_or_default(),
                tx_hash: log
                    .transaction_hash
                    .map(|h| format!("0x{h:x}"))
                    .unwrap_or_default(),
                parsed: decode_log(log),
            })
            .collect())
    }

    async fn submit_batch(&self, signed: &SignedBatch) -> Result<String, AdapterError> {
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(self.wallet())
            .on_http(
                self.rpc_url
                    .parse()
                    .map_err(|e| AdapterError::Unavailable(format!("Invalid RPC URL: {e}")))?,
            );
        let contract = Gravity::new(self.bridge_address, &provider);
        let batch = &signed.batch;

        let signatures: Vec<Bytes> = signed
            .signatures
            .iter()
            .map(|(_, sig)| Bytes::from(sig.clone()))
            .collect();
        let ids = batch.transfers.iter().map(|t| U256::from(t.id)).collect();
        let amounts = batch.transfers.iter().map(|t| U256::from(t.amount)).collect();
        let destinations = batch.transfers.iter().map(|t| t.eth_recipient).collect();
        let fees = batch
            .transfers
            .iter()
            .map(|t| U256::from(t.bridge_fee))
            .collect();

        debug!(
            token = %batch.token_contract,
            nonce = batch.nonce,
            signatures = signatures.len(),
            "Submitting submitBatch"
        );

        let pending_tx = contract
            .submitBatch(
                signatures,
                ids,
                amounts,
                destinations,
                fees,
                U256::from(batch.nonce),
                batch.token_contract,
            )
            .send()
            .await
            .map_err(|e| call_error("Failed to send submitBatch", e))?;

        let tx_hash = *pending_tx.tx_hash();
        info!(tx_hash = %tx_hash, nonce = batch.nonce, "Batch transaction sent");

        let receipt = pending_tx
            .get_receipt()
            .await
            .map_err(|e| call_error("Failed to get receipt", e))?;
        if !receipt.status() {
            return Err(AdapterError::Reverted(format!(
                "submitBatch reverted in 0x{tx_hash:x}"
            )));
        }

        Ok(format!("0x{:x}", tx_hash))
    }

    async fn last_batch_nonce(&self, token_contract: EthAddress) -> Result<u64, AdapterError> {
        let provider = self.read_provider()?;
        let contract = Gravity::new(self.bridge_address, &provider);
        let nonce = contract
            .lastBatchNonce(token_contract)
            .call()
            .await
            .map_err(|e| call_error("lastBatchNonce", e))?
            .nonce;
        to_u64(nonce, "lastBatchNonce").map_err(AdapterError::Malformed)
    }

    async fn deploy_erc20(&self, metadata: &DenomMetadata) -> Result<EthAddress, AdapterError> {
        // Only a deployment with identical metadata can be adopted on Hilo
        if let Some(existing) = self.erc20_for_denom(&metadata.denom).await? {
            if self.token_matches(existing, metadata).await? {
                debug!(denom = %metadata.denom, token = %existing, "ERC20 already deployed");
                return Ok(existing);
            }
            warn!(
                denom = %metadata.denom,
                token = %existing,
                "Existing ERC20 has different metadata, deploying a new one"
            );
        }

        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(self.wallet())
            .on_http(
                self.rpc_url
                    .parse()
                    .map_err(|e| AdapterError::Unavailable(format!("Invalid RPC URL: {e}")))?,
            );
        let contract = Gravity::new(self.bridge_address, &provider);

        let pending_tx = contract
            .deployERC20(
                metadata.denom.clone(),
                metadata.name.clone(),
                metadata.symbol.clone(),
                metadata.decimals,
            )
            .send()
            .await
            .map_err(|e| call_error("Failed to send deployERC20", e))?;
        let receipt = pending_tx
            .get_receipt()
            .await
            .map_err(|e| call_error("Failed to get receipt", e))?;
        if !receipt.status() {
            return Err(AdapterError::Reverted(format!(
                "deployERC20 reverted for {}",
                metadata.denom
            )));
        }

        let token = deployed_token(receipt.inner.logs(), &metadata.denom).ok_or_else(|| {
            AdapterError::Malformed(format!(
                "deployERC20 receipt has no deployment event for {}",
                metadata.denom
            ))
        })?;
        info!(denom = %metadata.denom, token = %token, "ERC20 deployed");
        Ok(token)
    }

    async fn query_token_balance(
        &self,
        token_contract: EthAddress,
        account: EthAddress,
    ) -> Result<u64, AdapterError> {
        let provider = self.read_provider()?;
        let token = IERC20::new(token_contract, &provider);
        let balance = token
            .balanceOf(account)
            .call()
            .await
            .map_err(|e| call_error("balanceOf", e))?
            .balance;
        Ok(u64::try_from(balance).unwrap_or(u64::MAX))
    }

    async fn send_to_cosmos(
        &self,
        token_contract: EthAddress,
        cosmos_recipient: &str,
        amount: u64,
    ) -> Result<String, AdapterError> {
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(self.wallet())
            .on_http(
                self.rpc_url
                    .parse()
                    .map_err(|e| AdapterError::Unavailable(format!("Invalid RPC URL: {e}")))?,
            );

        let token = IERC20::new(token_contract, &provider);
        let approval = token
            .approve(self.bridge_address, U256::from(amount))
            .send()
            .await
            .map_err(|e| call_error("Failed to send approve", e))?
            .get_receipt()
            .await
            .map_err(|e| call_error("Failed to get receipt", e))?;
        if !approval.status() {
            warn!(token = %token_contract, "approve reverted");
            return Err(AdapterError::Reverted("approve reverted".to_string()));
        }

        let contract = Gravity::new(self.bridge_address, &provider);
        let pending_tx = contract
            .sendToCosmos(token_contract, cosmos_recipient.to_string(), U256::from(amount))
            .send()
            .await
            .map_err(|e| call_error("Failed to send sendToCosmos", e))?;
        let tx_hash = *pending_tx.tx_hash();
        let receipt = pending_tx
            .get_receipt()
            .await
            .map_err(|e| call_error("Failed to get receipt", e))?;
        if !receipt.status() {
            return Err(AdapterError::Reverted("sendToCosmos reverted".to_string()));
        }

        Ok(format!("0x{:x}", tx_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_error_classification() {
        assert!(matches!(
            call_error("submitBatch", "execution reverted: insufficient power"),
            AdapterError::Reverted(_)
        ));
        assert!(matches!(
            call_error("getLogs", "connection refused"),
            AdapterError::Unavailable(_)
        ));
    }

    #[test]
    fn test_to_u64_rejects_overflow() {
        assert_eq!(to_u64(U256::from(42u64), "x"), Ok(42));
        assert!(to_u64(U256::MAX, "x").is_err());
    }

    fn deployed_log(denom: &str, token: Address) -> Log {
        let event = Gravity::ERC20DeployedEvent {
            cosmosDenom: denom.to_string(),
            tokenContract: token,
            name: denom.to_string(),
            symbol: denom.to_uppercase(),
            decimals: 6,
            eventNonce: U256::from(1u64),
        };
        Log {
            inner: alloy::primitives::Log {
                address: Address::repeat_byte(0xb0),
                data: event.encode_log_data(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_deployed_token_comes_from_receipt_event() {
        let logs = vec![
            deployed_log("other", Address::repeat_byte(1)),
            deployed_log("photon", Address::repeat_byte(2)),
        ];
        assert_eq!(deployed_token(&logs, "photon"), Some(Address::repeat_byte(2)));
        assert_eq!(deployed_token(&logs, "uhilo"), None);
        assert!(matches!(
            decode_log(&logs[1]),
            Ok(EventClaim::Erc20Deployed(c)) if c.token_contract == Address::repeat_byte(2)
        ));
    }

    #[test]
    fn test_new_rejects_bad_address() {
        let signer = PrivateKeySigner::random();
        assert!(EvmClient::new("http://localhost:8545", "not-an-address", signer).is_err());
    }
}
