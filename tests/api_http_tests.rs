// ============================================================================
// HTTP API TESTS — full stack over a real socket
// ============================================================================
//
// Binds the router to an ephemeral port with in-memory collaborators and
// drives it through the typed client, so the camelCase wire contract is
// exercised in both directions.
//
// ============================================================================

use std::sync::Arc;

use house::api::{build_router, AppState};
use house::client::{ClientError, HouseClient};
use house::engine::Engine;
use house::mocks::{MemoryLedger, MockTreasury};
use house::storage::LedgerStore;
use serde_json::json;

const ALICE: &str = "0xAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaa";
const TOKEN: &str = "0x20c0000000000000000000000000000000000001";
const TX: &str = "0xdeadbeef";

async fn spawn_server() -> (HouseClient, MemoryLedger, MockTreasury) {
    let store = MemoryLedger::new();
    let treasury = MockTreasury::returning(TX);
    let engine = Engine::new(store.clone(), treasury.clone());
    let app = build_router(AppState {
        engine: Arc::new(engine),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral port should bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server should run");
    });

    (
        HouseClient::new(&format!("http://{addr}")),
        store,
        treasury,
    )
}

#[tokio::test]
async fn absent_balance_reads_as_zero_free_tier() {
    let (client, _, _) = spawn_server().await;

    let view = client.fetch_balance(ALICE, TOKEN).await.unwrap();
    assert_eq!(view.balance, 0.0);
    assert_eq!(view.tier, "free");
    assert!(
        view.updated_at.is_none(),
        "a never-seen account has no update timestamp"
    );
}

#[tokio::test]
async fn malformed_address_is_a_400_with_reason() {
    let (client, _, _) = spawn_server().await;

    let err = client
        .fetch_balance("not-an-address", TOKEN)
        .await
        .unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 400);
            assert!(
                message.contains("address"),
                "reason should name the problem, got: {message}"
            );
        }
        other => panic!("expected Api error, got {other}"),
    }
}

#[tokio::test]
async fn end_to_end_gameplay_over_http() {
    let (client, _, _) = spawn_server().await;

    let ack = client.deposit(ALICE, TOKEN, 100.0, TX).await.unwrap();
    assert_eq!(ack.new_balance, 100.0);

    let bet = client.bet(ALICE, TOKEN, 30.0).await.unwrap();
    assert_eq!(bet.remaining_balance, 70.0);
    assert!(bet.bet_id.starts_with("bet_"));

    let win = client.win(ALICE, TOKEN, 57.0, &bet.bet_id).await.unwrap();
    assert_eq!(win.new_balance, 127.0);

    let withdrawal = client.withdraw(ALICE, TOKEN, 27.0).await.unwrap();
    assert_eq!(withdrawal.tx_hash, TX);
    assert_eq!(withdrawal.new_balance, Some(100.0));
    assert!(withdrawal.warning.is_none());

    let view = client.fetch_balance(ALICE, TOKEN).await.unwrap();
    assert_eq!(view.balance, 100.0);
    assert!(view.updated_at.is_some());
}

#[tokio::test]
async fn insufficient_balance_maps_to_400() {
    let (client, _, treasury) = spawn_server().await;
    client.deposit(ALICE, TOKEN, 20.0, TX).await.unwrap();

    let err = client.bet(ALICE, TOKEN, 21.0).await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Insufficient house balance");
        }
        other => panic!("expected Api error, got {other}"),
    }

    let err = client.withdraw(ALICE, TOKEN, 21.0).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 400, .. }));
    assert_eq!(treasury.calls(), 0, "no transfer may be attempted");
}

#[tokio::test]
async fn unknown_account_withdrawal_maps_to_404() {
    let (client, _, _) = spawn_server().await;

    let err = client.withdraw(ALICE, TOKEN, 10.0).await.unwrap_err();
    assert!(
        matches!(err, ClientError::Api { status: 404, .. }),
        "got: {err}"
    );
}

#[tokio::test]
async fn failed_transfer_maps_to_500_and_preserves_balance() {
    let (client, _, treasury) = spawn_server().await;
    client.deposit(ALICE, TOKEN, 100.0, TX).await.unwrap();
    treasury.set_fail(true);

    let err = client.withdraw(ALICE, TOKEN, 40.0).await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 500);
            assert!(
                message.starts_with("Withdrawal failed"),
                "got: {message}"
            );
        }
        other => panic!("expected Api error, got {other}"),
    }

    let view = client.fetch_balance(ALICE, TOKEN).await.unwrap();
    assert_eq!(view.balance, 100.0, "failed transfer must not debit");
}

#[tokio::test]
async fn reconciliation_needed_is_a_200_with_warning() {
    let (client, store, _) = spawn_server().await;
    client.deposit(ALICE, TOKEN, 100.0, TX).await.unwrap();
    store.set_fail_balance_writes(true);

    let ack = client.withdraw(ALICE, TOKEN, 60.0).await.unwrap();
    assert_eq!(ack.tx_hash, TX, "the on-chain tx is reported to the caller");
    assert_eq!(ack.intended_balance, Some(40.0));
    assert!(ack.new_balance.is_none());
    assert!(
        ack.warning
            .as_deref()
            .is_some_and(|w| w.contains("contact support")),
        "partial success must carry the support warning, got {:?}",
        ack.warning
    );
}

#[tokio::test]
async fn save_bet_roundtrip_and_missing_fields() {
    let (client, store, _) = spawn_server().await;

    client
        .save_bet(json!({
            "id": "bet_99",
            "walletAddress": ALICE,
            "tokenAddress": TOKEN,
            "asset": "ETH",
            "direction": "DOWN",
            "amount": 10.0,
            "multiplier": 1.9,
            "strikePrice": 3200.0,
            "endPrice": 3150.0,
            "payout": 19.0,
            "won": true,
        }))
        .await
        .unwrap();

    let stored = store.get_bet("bet_99").unwrap().expect("bet should persist");
    assert_eq!(stored.asset, "ETH");
    assert_eq!(stored.wallet_address, ALICE.to_lowercase());
    assert_eq!(stored.network, "TEMPO", "omitted fields take defaults");
    assert_eq!(stored.mode, "classic");

    let err = client
        .save_bet(json!({ "walletAddress": ALICE }))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ClientError::Api { status: 400, .. }),
        "missing bet id must be rejected, got: {err}"
    );
}

#[tokio::test]
async fn missing_request_fields_are_named() {
    // Raw request bypassing the typed client: deposit without txHash.
    let store = MemoryLedger::new();
    let treasury = MockTreasury::returning(TX);
    let app = build_router(AppState {
        engine: Arc::new(Engine::new(store, treasury)),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/balance/deposit"))
        .json(&json!({ "userAddress": ALICE, "amount": 10.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    let message = body["error"].as_str().unwrap_or_default();
    assert!(
        message.contains("txHash"),
        "error should name the missing field, got: {message}"
    );
}
