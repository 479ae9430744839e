//! The `/verify` contract exercised over HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::TestHarness;
use futures::future::join_all;
use serde_json::json;
use token_credit::ledger::{Address, LedgerTransaction, Signature, Transfer};

fn land(harness: &TestHarness, payer: &Address, seed: u8, lamports: u64) -> Signature {
    let signature = Signature::from_bytes([seed; 64]);
    harness.ledger().insert_transaction(LedgerTransaction {
        signature: signature.clone(),
        success: true,
        transfer: Some(Transfer {
            sender: payer.clone(),
            recipient: harness.treasury().clone(),
            lamports,
        }),
    });
    signature
}

#[tokio::test]
async fn test_replayed_verify_returns_same_credit() {
    let harness = TestHarness::setup().await.expect("harness");
    let payer = harness.funded_account(0);
    let sig = land(&harness, &payer, 1, 180_000_000);

    let first = harness.post_verify(&payer, &sig, "triple").await.expect("first");
    let second = harness.post_verify(&payer, &sig, "triple").await.expect("second");

    assert_eq!(first, (200, json!({"credited": 3})));
    assert_eq!(second, (200, json!({"credited": 3})));
    assert_eq!(harness.balance(&payer).await.expect("balance"), 3);
    assert_eq!(harness.ledger().transaction_fetches(), 1);

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_concurrent_duplicates_credit_once() {
    let harness = TestHarness::setup().await.expect("harness");
    let payer = harness.funded_account(0);
    let sig = land(&harness, &payer, 2, 70_000_000);

    let results = join_all((0..8).map(|_| harness.post_verify(&payer, &sig, "single"))).await;

    for result in results {
        assert_eq!(result.expect("response"), (200, json!({"credited": 1})));
    }
    assert_eq!(harness.balance(&payer).await.expect("balance"), 1);
    let health = harness.health().await.expect("health");
    assert_eq!(health["processed"], 1);

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_concurrent_distinct_signatures_sum() {
    let harness = TestHarness::setup().await.expect("harness");
    let payer = harness.funded_account(0);
    let signatures: Vec<_> = (10..16)
        .map(|seed| land(&harness, &payer, seed, 500_000_000))
        .collect();

    let results = join_all(
        signatures
            .iter()
            .map(|sig| harness.post_verify(&payer, sig, "pack10")),
    )
    .await;

    for result in results {
        assert_eq!(result.expect("response").0, 200);
    }
    assert_eq!(harness.balance(&payer).await.expect("balance"), 60);

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_not_found_leaves_room_for_retry() {
    let harness = TestHarness::setup().await.expect("harness");
    let payer = harness.funded_account(0);
    let sig = land(&harness, &payer, 3, 180_000_000);
    harness.ledger().hide_transaction(&sig, 1);

    let (status, body) = harness.post_verify(&payer, &sig, "triple").await.expect("first");
    assert_eq!(status, 404);
    assert_eq!(body["kind"], "not_found");
    assert_eq!(harness.balance(&payer).await.expect("balance"), 0);

    let retry = harness.post_verify(&payer, &sig, "triple").await.expect("retry");
    assert_eq!(retry, (200, json!({"credited": 3})));

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_mismatched_amount_credits_nothing() {
    let harness = TestHarness::setup().await.expect("harness");
    let payer = harness.funded_account(0);
    let sig = land(&harness, &payer, 4, 70_000_000);

    let (status, body) = harness.post_verify(&payer, &sig, "triple").await.expect("verify");

    assert_eq!(status, 422);
    assert_eq!(body["kind"], "mismatched_transaction");
    assert!(body["error"].is_string());
    assert_eq!(harness.balance(&payer).await.expect("balance"), 0);

    // Someone else's payment cannot be claimed either
    let thief = harness.funded_account(0);
    let (status, _) = harness.post_verify(&thief, &sig, "single").await.expect("verify");
    assert_eq!(status, 422);
    assert_eq!(harness.balance(&thief).await.expect("balance"), 0);

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_unknown_address_has_zero_balance() {
    let harness = TestHarness::setup().await.expect("harness");
    let stranger = Address::from_bytes([0x42; 32]);

    assert_eq!(harness.balance(&stranger).await.expect("balance"), 0);

    harness.teardown().await.expect("teardown");
}
