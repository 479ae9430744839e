//! End-to-end tests: the real HTTP service against an in-memory ledger.
//!
//! Run with `cargo test --test e2e`.

mod harness;
mod purchase_flow;
mod verify_api;

pub use harness::{fast_payer_config, TestHarness, TestWallet};
