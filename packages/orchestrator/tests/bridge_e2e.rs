//! End-to-end bridge flows on a devnet: three orchestrators, an in-process
//! Hilo chain and the simulated Gravity contract.

use orchestrator::devnet::{eth_account, hilo_account, Devnet};
use orchestrator::ethereum::EthereumAdapter;
use orchestrator::retry::RetryConfig;

use hilo_bridge_core::{
    verify_signature, voucher_denom, BatchBuilderConfig, BatchStatus, BridgeParams, ClaimKind,
    Coin, DenomMetadata, EthAddress, TransferStatus, FEE_COLLECTOR_ACCOUNT,
};

const MAX_STEPS: usize = 40;

fn params() -> BridgeParams {
    BridgeParams {
        batch: BatchBuilderConfig {
            max_size: 100,
            interval_blocks: 1,
            timeout_blocks: 5,
        },
        ..BridgeParams::default()
    }
}

fn devnet() -> Devnet {
    Devnet::new(params(), 3, RetryConfig::default()).unwrap()
}

/// Step until the ERC20 for `denom` is registered on Hilo
async fn wait_for_erc20(devnet: &mut Devnet, denom: &str) -> EthAddress {
    let denom_owned = denom.to_string();
    let registered = devnet
        .run_until(MAX_STEPS, |cosmos, _| {
            let denom = denom_owned.clone();
            async move { cosmos.with_module(|m| m.erc20_for(&denom)).await.is_some() }
        })
        .await;
    assert!(registered, "ERC20 for {denom} never registered");
    devnet.erc20_for(denom).await.unwrap()
}

/// Step until outgoing transfer `id` has been executed on Ethereum
async fn wait_for_execution(devnet: &mut Devnet, id: u64) {
    let executed = devnet
        .run_until(MAX_STEPS, |cosmos, _| async move {
            cosmos.with_module(|m| m.outgoing_transfer(id).is_none()).await
        })
        .await;
    assert!(executed, "transfer {id} never executed");
}

async fn wait_for_cosmos_balance(devnet: &mut Devnet, account: &str, denom: &str, expected: u64) {
    let account = account.to_string();
    let denom = denom.to_string();
    let reached = devnet
        .run_until(MAX_STEPS, |cosmos, _| {
            let account = account.clone();
            let denom = denom.clone();
            async move {
                cosmos
                    .with_module(|m| m.balance(&account, &denom).amount)
                    .await
                    == expected
            }
        })
        .await;
    let actual = devnet.cosmos_balance(&account, &denom).await;
    assert!(reached, "balance of {account} stuck at {actual} {denom}, expected {expected}");
}

/// Hilo → Ethereum → Hilo for a Hilo-native denom, checking exact balances
async fn round_trip(
    denom: &str,
    initial: u64,
    amount: u64,
    bridge_fee: u64,
    chain_fee: Option<u64>,
) {
    let mut devnet = devnet();
    let user = hilo_account(&format!("{denom}-user"));
    let recipient = eth_account(&format!("{denom}-recipient"));
    devnet.fund(&user, &Coin::new(initial, denom)).await.unwrap();

    let id = devnet
        .cosmos
        .send_to_eth(
            &user,
            recipient,
            Coin::new(amount, denom),
            Coin::new(bridge_fee, denom),
            chain_fee.map(|fee| Coin::new(fee, denom)),
        )
        .await
        .unwrap();
    let after_send = initial - amount - bridge_fee - chain_fee.unwrap_or(0);
    assert_eq!(devnet.cosmos_balance(&user, denom).await, after_send);
    if let Some(fee) = chain_fee {
        assert_eq!(devnet.cosmos_balance(FEE_COLLECTOR_ACCOUNT, denom).await, fee);
    }

    let token = wait_for_erc20(&mut devnet, denom).await;
    wait_for_execution(&mut devnet, id).await;

    let received = devnet.eth_balance(token, recipient).await;
    assert!(
        (amount..=amount + bridge_fee).contains(&received),
        "recipient received {received}"
    );

    devnet
        .send_to_cosmos(recipient, token, &user, amount)
        .await
        .unwrap();
    wait_for_cosmos_balance(&mut devnet, &user, denom, after_send + amount).await;
}

#[tokio::test]
async fn test_photon_round_trip() {
    round_trip("photon", 10_000_000_000, 100, 3, Some(10)).await;
}

#[tokio::test]
async fn test_uhilo_round_trip() {
    round_trip("uhilo", 10_000_000_000, 300, 7, None).await;
}

#[tokio::test]
async fn test_ibc_stake_round_trip() {
    round_trip(
        "ibc/0429A217F7AFD21E67CABA80049DD56BB0380B77E9C58C831366D6626D42F399",
        3_300_000_000,
        300,
        7,
        None,
    )
    .await;
}

#[tokio::test]
async fn test_relayer_is_paid_the_batch_fee() {
    let mut devnet = devnet();
    let user = hilo_account("fee-user");
    devnet.fund(&user, &Coin::new(1_000, "uhilo")).await.unwrap();

    let mut ids = Vec::new();
    for fee in [7, 11] {
        ids.push(
            devnet
                .cosmos
                .send_to_eth(
                    &user,
                    eth_account("fee-recipient"),
                    Coin::new(100, "uhilo"),
                    Coin::new(fee, "uhilo"),
                    None,
                )
                .await
                .unwrap(),
        );
    }

    let token = wait_for_erc20(&mut devnet, "uhilo").await;
    for id in ids {
        wait_for_execution(&mut devnet, id).await;
    }

    let batch = devnet
        .cosmos
        .with_module(|m| m.batch(token, 1).cloned())
        .await
        .unwrap();
    assert_eq!(batch.status, BatchStatus::Executed);
    assert_eq!(batch.total_fee, 18);

    assert!(batch.submitted_tx.is_some());

    // Exactly one orchestrator relayed and collected the whole fee on Ethereum
    let mut paid = Vec::new();
    for i in 0..devnet.orchestrator_count() {
        let addr = devnet.orchestrator_address(i).unwrap();
        let balance = devnet.eth_balance(token, addr).await;
        let rewards = devnet
            .cosmos
            .with_module(|m| m.relayer_rewards(addr, "uhilo"))
            .await;
        assert_eq!(balance, rewards);
        if balance > 0 {
            paid.push(balance);
        }
    }
    assert_eq!(paid, vec![18]);
}

#[tokio::test]
async fn test_batch_confirms_sign_identical_checkpoint() {
    let mut devnet = devnet();
    let user = hilo_account("determinism-user");
    devnet.fund(&user, &Coin::new(10_000, "uhilo")).await.unwrap();
    let token = {
        devnet.deploy_erc20_for_denom("uhilo").await.unwrap();
        wait_for_erc20(&mut devnet, "uhilo").await
    };

    devnet.set_orchestrator_online(2, false);
    for fee in [5, 9, 7, 9] {
        devnet
            .cosmos
            .send_to_eth(
                &user,
                eth_account("determinism-recipient"),
                Coin::new(10, "uhilo"),
                Coin::new(fee, "uhilo"),
                None,
            )
            .await
            .unwrap();
    }
    let built = devnet.step().await;
    assert_eq!(built.len(), 1);
    // Both online orchestrators rebuild the batch, sign it and one relays it
    devnet.step().await;

    let (batch, confirms) = devnet
        .cosmos
        .with_module(|m| (m.batch(token, 1).cloned(), m.batch_confirms(token, 1)))
        .await;
    let batch = batch.unwrap();
    assert_eq!(batch.checkpoint, built[0].checkpoint);
    assert_eq!(batch.transfers, built[0].transfers);
    assert_eq!(batch.status, BatchStatus::Submitted);

    let fees: Vec<u64> = batch.transfers.iter().map(|t| t.bridge_fee).collect();
    assert_eq!(fees, vec![9, 9, 7, 5]);
    assert!(batch.transfers[0].id < batch.transfers[1].id);

    assert_eq!(confirms.len(), 2);
    assert_ne!(confirms[0].eth_address, confirms[1].eth_address);
    for confirm in &confirms {
        assert!(verify_signature(&batch.checkpoint, &confirm.signature, &confirm.eth_address).is_ok());
    }
}

#[tokio::test]
async fn test_unsigned_batch_times_out_and_returns_transfers() {
    // Batches are only built every 10 blocks, so an expired batch is not
    // rebuilt in the block that times it out
    let batch = BatchBuilderConfig {
        max_size: 100,
        interval_blocks: 10,
        timeout_blocks: 5,
    };
    let mut devnet = Devnet::new(
        BridgeParams {
            batch: batch.clone(),
            ..BridgeParams::default()
        },
        3,
        RetryConfig::default(),
    )
    .unwrap();
    let user = hilo_account("timeout-user");
    devnet.fund(&user, &Coin::new(10_000, "uhilo")).await.unwrap();
    devnet.deploy_erc20_for_denom("uhilo").await.unwrap();
    let token = wait_for_erc20(&mut devnet, "uhilo").await;

    for i in 0..devnet.orchestrator_count() {
        devnet.set_orchestrator_online(i, false);
    }
    let id = devnet
        .cosmos
        .send_to_eth(
            &user,
            eth_account("timeout-recipient"),
            Coin::new(300, "uhilo"),
            Coin::new(7, "uhilo"),
            None,
        )
        .await
        .unwrap();

    let mut built = Vec::new();
    for _ in 0..batch.interval_blocks {
        built = devnet.step().await;
        if !built.is_empty() {
            break;
        }
    }
    assert_eq!(built.len(), 1);
    assert_eq!(built[0].nonce, 1);

    let state = |devnet: &Devnet| {
        let cosmos = devnet.cosmos.clone();
        async move {
            cosmos
                .with_module(|m| {
                    (
                        m.batch(token, 1).map(|b| b.status),
                        m.outgoing_transfer(id).map(|t| t.status),
                    )
                })
                .await
        }
    };

    devnet.run_blocks(batch.timeout_blocks as usize - 1).await;
    assert_eq!(
        state(&devnet).await,
        (Some(BatchStatus::Pending), Some(TransferStatus::Batched))
    );

    devnet.step().await;
    assert_eq!(
        state(&devnet).await,
        (Some(BatchStatus::TimedOut), Some(TransferStatus::Pending))
    );

    // Once signers return, a fresh nonce carries the transfer out
    for i in 0..devnet.orchestrator_count() {
        devnet.set_orchestrator_online(i, true);
    }
    wait_for_execution(&mut devnet, id).await;
    let (first, executed_nonce) = devnet
        .cosmos
        .with_module(|m| {
            (
                m.batch(token, 1).map(|b| b.status),
                m.batches_for(token)
                    .find(|b| b.status == BatchStatus::Executed)
                    .map(|b| b.nonce),
            )
        })
        .await;
    assert_eq!(first, Some(BatchStatus::TimedOut));
    assert_eq!(executed_nonce, Some(2));
}

#[tokio::test]
async fn test_ethereum_token_voucher_round_trip() {
    let mut devnet = devnet();
    let holder = eth_account("erc20-holder");
    let user = hilo_account("voucher-user");
    let token = devnet
        .eth
        .create_token("Wrapped Ether", "WETH", 18, holder, 1_000_000)
        .await;
    let denom = voucher_denom(&token);

    devnet.send_to_cosmos(holder, token, &user, 500).await.unwrap();
    wait_for_cosmos_balance(&mut devnet, &user, &denom, 500).await;
    assert_eq!(devnet.cosmos.with_module(|m| m.supply(&denom)).await, 500);

    let recipient = eth_account("voucher-recipient");
    let id = devnet
        .cosmos
        .send_to_eth(
            &user,
            recipient,
            Coin::new(200, &denom),
            Coin::new(5, &denom),
            None,
        )
        .await
        .unwrap();
    // Vouchers leaving Hilo are burned
    assert_eq!(devnet.cosmos.with_module(|m| m.supply(&denom)).await, 295);

    wait_for_execution(&mut devnet, id).await;
    assert_eq!(devnet.eth_balance(token, recipient).await, 200);
    assert_eq!(devnet.cosmos_balance(&user, &denom).await, 295);
}

#[tokio::test]
async fn test_quorum_survives_one_offline_orchestrator() {
    let mut devnet = devnet();
    devnet.set_orchestrator_online(2, false);

    let holder = eth_account("quorum-holder");
    let token = devnet.eth.create_token("Dai", "DAI", 18, holder, 1_000).await;
    let user = hilo_account("quorum-user");
    devnet.send_to_cosmos(holder, token, &user, 42).await.unwrap();

    wait_for_cosmos_balance(&mut devnet, &user, &voucher_denom(&token), 42).await;
}

#[tokio::test]
async fn test_no_quorum_with_two_offline_orchestrators() {
    let mut devnet = devnet();
    devnet.set_orchestrator_online(1, false);
    devnet.set_orchestrator_online(2, false);

    let holder = eth_account("quorum-holder");
    let token = devnet.eth.create_token("Dai", "DAI", 18, holder, 1_000).await;
    let user = hilo_account("quorum-user");
    devnet.send_to_cosmos(holder, token, &user, 42).await.unwrap();

    devnet.run_blocks(10).await;
    assert_eq!(devnet.cosmos_balance(&user, &voucher_denom(&token)).await, 0);
    assert_eq!(
        devnet
            .cosmos
            .with_module(|m| m.last_observed_nonce(ClaimKind::Deposit))
            .await,
        0
    );

    // The lagging orchestrator replays the event and completes the quorum
    devnet.set_orchestrator_online(1, true);
    wait_for_cosmos_balance(&mut devnet, &user, &voucher_denom(&token), 42).await;
}

#[tokio::test]
async fn test_malformed_log_does_not_block_later_events() {
    let mut devnet = devnet();
    let holder = eth_account("malformed-holder");
    let token = devnet.eth.create_token("Dai", "DAI", 18, holder, 1_000).await;
    let user = hilo_account("malformed-user");

    devnet.eth.inject_malformed_log("truncated data").await;
    devnet.send_to_cosmos(holder, token, &user, 9).await.unwrap();

    wait_for_cosmos_balance(&mut devnet, &user, &voucher_denom(&token), 9).await;
    let stats = devnet.stats();
    let malformed = stats[0].read().await.malformed_events;
    assert_eq!(malformed, 1);
}

#[tokio::test]
async fn test_cancel_refunds_unbatched_transfer() {
    let mut devnet = devnet();
    for i in 0..devnet.orchestrator_count() {
        devnet.set_orchestrator_online(i, false);
    }
    let user = hilo_account("cancel-user");
    devnet.fund(&user, &Coin::new(1_000, "photon")).await.unwrap();

    let id = devnet
        .cosmos
        .send_to_eth(
            &user,
            eth_account("cancel-recipient"),
            Coin::new(100, "photon"),
            Coin::new(3, "photon"),
            Some(Coin::new(10, "photon")),
        )
        .await
        .unwrap();
    // No ERC20 yet, so the transfer cannot be batched
    devnet.run_blocks(3).await;

    let refund = devnet.cosmos.cancel_send_to_eth(&user, id).await.unwrap();
    assert_eq!(refund, Coin::new(103, "photon"));
    assert_eq!(devnet.cosmos_balance(&user, "photon").await, 990);
    assert!(devnet.cosmos.cancel_send_to_eth(&user, id).await.is_err());
}

#[tokio::test]
async fn test_deploy_is_idempotent_across_orchestrators() {
    let mut devnet = devnet();
    let user = hilo_account("deploy-user");
    devnet.fund(&user, &Coin::new(1_000, "uhilo")).await.unwrap();
    devnet
        .cosmos
        .send_to_eth(
            &user,
            eth_account("deploy-recipient"),
            Coin::new(1, "uhilo"),
            Coin::new(1, "uhilo"),
            None,
        )
        .await
        .unwrap();

    let token = wait_for_erc20(&mut devnet, "uhilo").await;
    assert_eq!(devnet.eth.erc20_for_denom("uhilo").await, Some(token));
    assert_eq!(devnet.deploy_erc20_for_denom("uhilo").await.unwrap(), token);

    let deployments = devnet
        .eth
        .query_events(0, u64::MAX)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|log| log.parsed.ok())
        .filter(|claim| claim.kind() == ClaimKind::Erc20Deployed)
        .count();
    assert_eq!(deployments, 1);
}

#[tokio::test]
async fn test_bad_metadata_deploy_does_not_block_denom() {
    let mut devnet = devnet();
    let squatter = devnet.eth.connect(eth_account("squatter"));
    let metadata = devnet
        .cosmos
        .with_module(|m| m.denom_metadata("photon"))
        .await;
    let bad = DenomMetadata {
        name: "Fake Photon".to_string(),
        decimals: metadata.decimals.wrapping_add(1),
        ..metadata.clone()
    };
    let squatted = squatter.deploy_erc20(&bad).await.unwrap();
    devnet.run_blocks(10).await;
    assert_eq!(devnet.erc20_for("photon").await, None);

    let token = devnet.deploy_erc20_for_denom("photon").await.unwrap();
    assert_ne!(token, squatted);
    assert_eq!(wait_for_erc20(&mut devnet, "photon").await, token);

    // Transfers of the denom now batch against the honest token
    let user = hilo_account("photon-user");
    let recipient = eth_account("photon-recipient");
    devnet.fund(&user, &Coin::new(1_000, "photon")).await.unwrap();
    let id = devnet
        .cosmos
        .send_to_eth(
            &user,
            recipient,
            Coin::new(100, "photon"),
            Coin::new(3, "photon"),
            None,
        )
        .await
        .unwrap();
    wait_for_execution(&mut devnet, id).await;
    assert_eq!(devnet.eth_balance(token, recipient).await, 100);
    assert_eq!(devnet.eth_balance(squatted, recipient).await, 0);
}
