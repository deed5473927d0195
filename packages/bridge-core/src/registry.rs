//! Fee & denom registry
//!
//! Maps Cosmos denominations to their ERC20 contracts and holds the minimum
//! bridge fee schedule. Mappings are additive only: once a denom has a
//! contract it is never remapped, so historical batches stay valid.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::address_codec::{parse_voucher_denom, voucher_denom};
use crate::error::BridgeError;
use crate::types::EthAddress;

/// Decimals used for Cosmos denoms without explicit metadata
pub const DEFAULT_DECIMALS: u8 = 6;

/// Where a bridged token was first issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenOrigin {
    /// Native to Hilo; escrowed by the bridge while on Ethereum
    Cosmos,
    /// Native to Ethereum; represented on Hilo by a burnable voucher
    Ethereum,
}

/// Display metadata the ERC20 for a Cosmos denom must be deployed with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenomMetadata {
    pub denom: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl DenomMetadata {
    /// Metadata derived from the denom itself
    pub fn default_for(denom: &str) -> Self {
        Self {
            denom: denom.to_string(),
            name: denom.to_string(),
            symbol: denom.to_uppercase(),
            decimals: DEFAULT_DECIMALS,
        }
    }
}

/// One registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenomEntry {
    pub denom: String,
    pub erc20: Option<EthAddress>,
    pub origin: TokenOrigin,
}

/// Minimum bridge fee schedule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Floor for denoms without an explicit entry
    pub default_min_bridge_fee: u64,
    /// Per-denom floors
    pub min_bridge_fees: BTreeMap<String, u64>,
}

impl FeeSchedule {
    pub fn new(default_min_bridge_fee: u64) -> Self {
        Self {
            default_min_bridge_fee,
            min_bridge_fees: BTreeMap::new(),
        }
    }

    pub fn with_minimum(mut self, denom: impl Into<String>, minimum: u64) -> Self {
        self.min_bridge_fees.insert(denom.into(), minimum);
        self
    }

    /// Minimum bridge fee accepted for `denom`
    pub fn minimum_bridge_fee(&self, denom: &str) -> u64 {
        self.min_bridge_fees
            .get(denom)
            .copied()
            .unwrap_or(self.default_min_bridge_fee)
    }
}

/// Registry of denom ⇄ ERC20 mappings
#[derive(Debug, Default, Clone)]
pub struct DenomRegistry {
    entries: BTreeMap<String, DenomEntry>,
    by_contract: HashMap<EthAddress, String>,
    metadata: BTreeMap<String, DenomMetadata>,
    pending_deployments: BTreeSet<String>,
}

impl DenomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register display metadata for a Cosmos denom (genesis)
    pub fn set_metadata(&mut self, metadata: DenomMetadata) {
        self.metadata.insert(metadata.denom.clone(), metadata);
    }

    /// Metadata the ERC20 for `denom` must carry
    pub fn metadata(&self, denom: &str) -> DenomMetadata {
        self.metadata
            .get(denom)
            .cloned()
            .unwrap_or_else(|| DenomMetadata::default_for(denom))
    }

    pub fn entry(&self, denom: &str) -> Option<&DenomEntry> {
        self.entries.get(denom)
    }

    pub fn erc20_for(&self, denom: &str) -> Option<EthAddress> {
        self.entries.get(denom).and_then(|e| e.erc20)
    }

    pub fn denom_for(&self, contract: &EthAddress) -> Option<&str> {
        self.by_contract.get(contract).map(String::as_str)
    }

    /// Origin of `denom`; vouchers are always Ethereum-originated
    pub fn origin(&self, denom: &str) -> TokenOrigin {
        match self.entries.get(denom) {
            Some(entry) => entry.origin,
            None if parse_voucher_denom(denom).is_some() => TokenOrigin::Ethereum,
            None => TokenOrigin::Cosmos,
        }
    }

    /// Make sure `denom` has an entry, creating it lazily on first use.
    ///
    /// Returns true when a new Cosmos-originated entry was created, which
    /// queues an ERC20 deployment request.
    pub fn ensure_entry(&mut self, denom: &str) -> bool {
        if self.entries.contains_key(denom) {
            return false;
        }

        if let Some(token) = parse_voucher_denom(denom) {
            self.insert_mapping(denom, token, TokenOrigin::Ethereum);
            return false;
        }

        self.entries.insert(
            denom.to_string(),
            DenomEntry {
                denom: denom.to_string(),
                erc20: None,
                origin: TokenOrigin::Cosmos,
            },
        );
        self.pending_deployments.insert(denom.to_string());
        true
    }

    /// Record the ERC20 deployed for a Cosmos denom.
    ///
    /// Registering the same contract again is a no-op; any attempt to remap
    /// the denom or reuse a contract fails.
    pub fn register_erc20(
        &mut self,
        metadata: &DenomMetadata,
        contract: EthAddress,
    ) -> Result<(), BridgeError> {
        let denom = metadata.denom.as_str();

        if let Some(existing) = self.erc20_for(denom) {
            if existing == contract {
                return Ok(());
            }
            return Err(BridgeError::DenomAlreadyMapped {
                denom: denom.to_string(),
                existing,
            });
        }

        if let Some(other) = self.by_contract.get(&contract) {
            return Err(BridgeError::DenomAlreadyMapped {
                denom: other.clone(),
                existing: contract,
            });
        }

        if parse_voucher_denom(denom).is_some() {
            return Err(BridgeError::MetadataMismatch(denom.to_string()));
        }

        if self.metadata(denom) != *metadata {
            return Err(BridgeError::MetadataMismatch(denom.to_string()));
        }

        self.insert_mapping(denom, contract, TokenOrigin::Cosmos);
        self.pending_deployments.remove(denom);
        Ok(())
    }

    /// Resolve the denom for a deposited token, registering an Ethereum
    /// voucher on first sight.
    pub fn denom_for_deposit(&mut self, contract: EthAddress) -> String {
        if let Some(denom) = self.by_contract.get(&contract) {
            return denom.clone();
        }
        let denom = voucher_denom(&contract);
        self.insert_mapping(&denom, contract, TokenOrigin::Ethereum);
        denom
    }

    /// Denoms waiting for an ERC20 deployment
    pub fn pending_deployments(&self) -> Vec<DenomMetadata> {
        self.pending_deployments
            .iter()
            .map(|denom| self.metadata(denom))
            .collect()
    }

    /// All mapped entries
    pub fn entries(&self) -> impl Iterator<Item = &DenomEntry> {
        self.entries.values()
    }

    fn insert_mapping(&mut self, denom: &str, contract: EthAddress, origin: TokenOrigin) {
        self.entries.insert(
            denom.to_string(),
            DenomEntry {
                denom: denom.to_string(),
                erc20: Some(contract),
                origin,
            },
        );
        self.by_contract.insert(contract, denom.to_string());
    }
}
