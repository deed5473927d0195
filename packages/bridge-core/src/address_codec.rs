//! Address encoding for both sides of the bridge
//!
//! Hilo accounts are bech32 (`hilo1...`), Ethereum accounts are 20-byte hex.
//! Tokens that originate on Ethereum are represented on Hilo by voucher
//! denoms of the form `gravity0x<checksummed contract>`.

use bech32::{self, FromBase32, ToBase32, Variant};
use std::str::FromStr;

use crate::error::BridgeError;
use crate::types::EthAddress;

/// Prefix of voucher denoms for Ethereum-originated tokens
pub const VOUCHER_DENOM_PREFIX: &str = "gravity";

/// Decode a bech32 address to raw 20 bytes, returning the human readable prefix
pub fn decode_bech32_address(addr: &str) -> Result<([u8; 20], String), BridgeError> {
    let (hrp, data, _variant) = bech32::decode(addr)
        .map_err(|e| BridgeError::InvalidAddress(format!("{addr}: {e}")))?;

    let bytes = Vec::<u8>::from_base32(&data)
        .map_err(|e| BridgeError::InvalidAddress(format!("{addr}: {e}")))?;

    if bytes.len() != 20 {
        return Err(BridgeError::InvalidAddress(format!(
            "{addr}: expected 20 bytes, got {}",
            bytes.len()
        )));
    }

    let mut result = [0u8; 20];
    result.copy_from_slice(&bytes);
    Ok((result, hrp))
}

/// Encode raw 20 bytes to a bech32 address with given prefix
pub fn encode_bech32_address(bytes: &[u8; 20], hrp: &str) -> Result<String, BridgeError> {
    bech32::encode(hrp, bytes.to_base32(), Variant::Bech32)
        .map_err(|e| BridgeError::InvalidAddress(format!("failed to encode bech32: {e}")))
}

/// Check that `addr` is a bech32 account address with the expected prefix
pub fn validate_cosmos_address(addr: &str, expected_hrp: &str) -> Result<(), BridgeError> {
    let (_, hrp) = decode_bech32_address(addr)?;
    if hrp != expected_hrp {
        return Err(BridgeError::InvalidAddress(format!(
            "{addr}: expected prefix {expected_hrp}, got {hrp}"
        )));
    }
    Ok(())
}

/// Parse a 0x-prefixed Ethereum address
pub fn parse_eth_address(addr: &str) -> Result<EthAddress, BridgeError> {
    EthAddress::from_str(addr).map_err(|e| BridgeError::InvalidAddress(format!("{addr}: {e}")))
}

/// Voucher denom for an Ethereum-originated token
pub fn voucher_denom(token: &EthAddress) -> String {
    format!("{VOUCHER_DENOM_PREFIX}{token}")
}

/// Extract the token contract from a voucher denom, if `denom` is one
pub fn parse_voucher_denom(denom: &str) -> Option<EthAddress> {
    let rest = denom.strip_prefix(VOUCHER_DENOM_PREFIX)?;
    if !rest.starts_with("0x") {
        return None;
    }
    EthAddress::from_str(rest).ok()
}
