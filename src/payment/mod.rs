//! Payment verification for token-credit.
//!
//! A verification call turns a claimed transaction signature into credited
//! units at most once, however many times it is repeated:
//!
//! ```text
//! verify(payer, signature, tier)
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ Check replay cache  │──── HIT ───▶ recorded units
//! └─────────┬───────────┘
//!          MISS
//!           ▼
//! ┌─────────────────────┐
//! │ Lock signature,     │──── FOUND ─▶ recorded units
//! │ check credit store  │
//! └─────────┬───────────┘
//!          ABSENT
//!           ▼
//! ┌─────────────────────┐
//! │ getTransaction      │──── missing / failed / mismatch ─▶ error,
//! │ + validate          │                                    nothing stored
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐
//! │ insert signature +  │
//! │ increment balance   │  (one sled transaction)
//! └─────────┬───────────┘
//!           ▼
//!      bundle units
//! ```

mod cache;
mod locks;
mod verifier;

pub use cache::{CacheStats, ReplayCache};
pub use locks::{SignatureGuard, SignatureLocks};
pub use verifier::{Credit, Mismatch, PaymentVerifier, PaymentVerifierConfig, VerificationError};
