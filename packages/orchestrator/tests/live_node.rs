//! Checks against a real node with a deployed Gravity contract.
//!
//! Run with `ETH_RPC_URL` and `ETH_BRIDGE_ADDRESS` set, e.g. against Anvil:
//! `cargo test --test live_node -- --ignored`

use alloy::signers::local::PrivateKeySigner;

use orchestrator::ethereum::{EthereumAdapter, EvmClient};

fn live_client() -> EvmClient {
    let rpc_url = std::env::var("ETH_RPC_URL").unwrap_or_else(|_| "http://localhost:8545".into());
    let bridge = std::env::var("ETH_BRIDGE_ADDRESS").expect("ETH_BRIDGE_ADDRESS required");
    EvmClient::new(&rpc_url, &bridge, PrivateKeySigner::random()).unwrap()
}

#[tokio::test]
#[ignore = "requires a node with the Gravity contract deployed"]
async fn test_latest_block_and_event_scan() {
    let client = live_client();
    let latest = client.latest_block().await.unwrap();
    let logs = client
        .query_events(latest.saturating_sub(100), latest)
        .await
        .unwrap();
    for log in logs {
        assert!(log.block <= latest);
    }
}

#[tokio::test]
#[ignore = "requires a node with the Gravity contract deployed"]
async fn test_unknown_token_has_no_executed_batches() {
    let client = live_client();
    let nonce = client
        .last_batch_nonce(hilo_bridge_core::EthAddress::repeat_byte(0x42))
        .await
        .unwrap();
    assert_eq!(nonce, 0);
}
