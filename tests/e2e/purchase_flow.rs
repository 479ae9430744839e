//! Payer agent driving purchases through the HTTP service.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{fast_payer_config, TestHarness, TestWallet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use token_credit::payer::messages::purchase_message;
use token_credit::payer::{HttpVerificationClient, RejectionKind};
use token_credit::{Catalog, PayerAgent, PurchaseError, PurchaseOutcome, PurchaseState};

#[tokio::test]
async fn test_purchase_credits_balance() {
    let harness = TestHarness::setup().await.expect("harness");
    let payer = harness.funded_account(1_000_000_000);
    let mut agent = harness
        .agent(TestWallet::new(&payer), fast_payer_config())
        .expect("agent");

    let outcome = agent.purchase("triple").await.expect("purchase");

    assert!(matches!(outcome, PurchaseOutcome::Credited { units: 3, .. }));
    assert_eq!(agent.state(), PurchaseState::Success { units: 3 });
    assert_eq!(harness.balance(&payer).await.expect("balance"), 3);
    assert_eq!(
        harness.ledger().balance_of(harness.treasury()),
        180_000_000
    );

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_unconfirmed_payment_is_still_credited() {
    let harness = TestHarness::setup().await.expect("harness");
    harness.ledger().confirm_after(None);
    let payer = harness.funded_account(1_000_000_000);
    let mut agent = harness
        .agent(TestWallet::new(&payer), fast_payer_config())
        .expect("agent");

    let started = Instant::now();
    let outcome = agent.purchase("triple").await.expect("purchase");

    // Polling gave up after the ceiling, verification went ahead anyway
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(matches!(outcome, PurchaseOutcome::Credited { units: 3, .. }));
    assert_eq!(harness.balance(&payer).await.expect("balance"), 3);

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_insufficient_funds_moves_nothing() {
    let harness = TestHarness::setup().await.expect("harness");
    let payer = harness.funded_account(100_000_000);
    let mut agent = harness
        .agent(TestWallet::new(&payer), fast_payer_config())
        .expect("agent");

    let err = agent.purchase("triple").await.expect_err("too poor");

    assert!(matches!(
        err,
        PurchaseError::InsufficientFunds {
            required: 180_000_000,
            available: 100_000_000,
            ..
        }
    ));
    assert_eq!(
        purchase_message(&err),
        "Insufficient balance. Required: 0.18 SOL, Available: 0.1 SOL"
    );
    assert_eq!(harness.ledger().balance_of(&payer), 100_000_000);
    assert_eq!(harness.balance(&payer).await.expect("balance"), 0);

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_refused_signature_returns_to_idle() {
    let harness = TestHarness::setup().await.expect("harness");
    let payer = harness.funded_account(1_000_000_000);
    let mut agent = harness
        .agent(TestWallet::refusing(&payer), fast_payer_config())
        .expect("agent");

    let outcome = agent.purchase("single").await.expect("not an error");

    assert_eq!(outcome, PurchaseOutcome::Cancelled);
    assert_eq!(agent.state(), PurchaseState::Idle);
    assert_eq!(harness.ledger().balance_of(&payer), 1_000_000_000);

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_unreachable_service_surfaces_signature() {
    let harness = TestHarness::setup().await.expect("harness");
    let payer = harness.funded_account(1_000_000_000);
    let ledger = harness.ledger().clone();
    let treasury = harness.treasury().clone();
    harness.teardown().await.expect("teardown");

    // Same ledger, but the service is gone
    let client = HttpVerificationClient::new("http://127.0.0.1:1", Duration::from_secs(1))
        .expect("client");
    let mut agent = PayerAgent::new(
        fast_payer_config(),
        Arc::new(Catalog::default()),
        Arc::new(TestWallet::new(&payer)),
        Arc::new(client),
    )
    .with_ledger(ledger.clone())
    .with_recipient(treasury);

    let err = agent.purchase("single").await.expect_err("no service");

    let signature = err.signature().expect("signature kept for recovery");
    assert!(matches!(
        err,
        PurchaseError::VerificationFailed {
            kind: RejectionKind::Unreachable,
            ..
        }
    ));
    assert_eq!(
        agent.attempt().and_then(|a| a.signature.as_ref()),
        Some(signature)
    );
    assert!(purchase_message(&err).contains(signature.as_str()));
    // Funds left the payer (price plus the 5000 lamport fee) though nothing was credited
    assert_eq!(ledger.balance_of(&payer), 1_000_000_000 - 70_000_000 - 5_000);
}

#[tokio::test]
async fn test_sequential_purchases_accumulate() {
    let harness = TestHarness::setup().await.expect("harness");
    let payer = harness.funded_account(2_000_000_000);
    let mut agent = harness
        .agent(TestWallet::new(&payer), fast_payer_config())
        .expect("agent");

    for bundle in ["single", "triple", "pack10"] {
        agent.purchase(bundle).await.expect("purchase");
    }

    assert_eq!(harness.balance(&payer).await.expect("balance"), 14);
    let health = harness.health().await.expect("health");
    assert_eq!(health["processed"], 3);

    harness.teardown().await.expect("teardown");
}
