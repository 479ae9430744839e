//! # token-credit
//!
//! Exactly-once crediting of purchasable units ("search tokens") paid for with
//! a native SOL transfer.
//!
//! The crate has two halves that meet at the ledger:
//!
//! - [`payer`]: the Payer Agent state machine. It checks funds, builds a
//!   transfer, gets it signed through a [`payer::Signer`], submits it, polls
//!   for confirmation within a bounded window and then asks the verification
//!   service to credit the purchase.
//! - [`payment`]: the Verification Service. It re-derives the truth of a
//!   claimed signature from the ledger and credits the payer through the
//!   [`store::CreditStore`], whose signature guard makes every retry harmless.
//!
//! ```text
//! Payer Agent ── submit ──▶ Ledger ◀── getTransaction ── PaymentVerifier
//!      │                                                    │
//!      └──────── POST /verify {wallet, signature, tier} ───▶│
//!                                                           ▼
//!                                              CreditStore (sled, atomic)
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod event;
pub mod ledger;
pub mod payer;
pub mod payment;
pub mod server;
pub mod service;
pub mod store;

pub use catalog::{Bundle, Catalog};
pub use config::{LogFormat, ServiceConfig};
pub use error::{Error, Result};
pub use payer::{PayerAgent, PayerConfig, PurchaseError, PurchaseOutcome, PurchaseState};
pub use payment::{Credit, PaymentVerifier, VerificationError};
pub use service::{RunningService, ServiceBuilder, ShutdownHandle};
pub use store::{CreditOutcome, CreditStore, ProcessedSignature};
