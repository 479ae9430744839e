//! Purchase state machine.

use crate::ledger::{Address, Signature};
use crate::payer::error::PurchaseError;
use std::fmt;
use thiserror::Error;

/// Where a purchase currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PurchaseState {
    /// Nothing in flight.
    #[default]
    Idle,
    /// Checking funds and building the transfer.
    Building,
    /// Waiting for the wallet.
    Signing,
    /// Sending the signed transfer to the ledger.
    Submitting,
    /// Polling the ledger for confirmation.
    Confirming,
    /// Waiting for the verification service.
    Verifying,
    /// Units were credited.
    Success {
        /// Units credited for this purchase.
        units: u64,
    },
    /// The purchase failed.
    Error(PurchaseError),
}

impl PurchaseState {
    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Building => "building",
            Self::Signing => "signing",
            Self::Submitting => "submitting",
            Self::Confirming => "confirming",
            Self::Verifying => "verifying",
            Self::Success { .. } => "success",
            Self::Error(_) => "error",
        }
    }

    /// `success` or `error`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Error(_))
    }

    /// Whether the transition `self → next` is allowed.
    ///
    /// `confirming` only ever moves on to `verifying`: a submitted transfer is
    /// always taken to the verification service.
    #[must_use]
    pub fn can_transition_to(&self, next: &Self) -> bool {
        use PurchaseState as S;
        matches!(
            (self, next),
            (S::Idle, S::Building | S::Error(_))
                | (S::Building, S::Signing | S::Error(_))
                | (S::Signing, S::Submitting | S::Idle | S::Error(_))
                | (S::Submitting, S::Confirming | S::Error(_))
                | (S::Confirming, S::Verifying)
                | (S::Verifying, S::Success { .. } | S::Error(_))
                | (S::Success { .. } | S::Error(_), S::Idle)
        )
    }
}

impl fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A disallowed state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid purchase transition {from} -> {to}")]
pub struct InvalidTransition {
    /// State before.
    pub from: &'static str,
    /// Requested state.
    pub to: &'static str,
}

/// One purchase, owned by the agent and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseAttempt {
    /// Bundle being bought.
    pub bundle_id: String,
    /// Paying account, once the wallet reported one.
    pub payer: Option<Address>,
    /// Set as soon as submission succeeds and kept through every failure.
    pub signature: Option<Signature>,
    state: PurchaseState,
}

impl PurchaseAttempt {
    /// Start an attempt in `idle`.
    #[must_use]
    pub fn new(bundle_id: impl Into<String>, payer: Option<Address>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            payer,
            signature: None,
            state: PurchaseState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &PurchaseState {
        &self.state
    }

    /// Move to `next` if the state machine allows it.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and leaves the state unchanged otherwise.
    pub fn advance(&mut self, next: PurchaseState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(&next) {
            return Err(InvalidTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::payer::error::MissingDependency;

    fn error() -> PurchaseState {
        PurchaseState::Error(PurchaseError::ServiceUnavailable {
            missing: MissingDependency::Wallet,
        })
    }

    #[test]
    fn test_happy_path() {
        let mut attempt = PurchaseAttempt::new("triple", None);
        for next in [
            PurchaseState::Building,
            PurchaseState::Signing,
            PurchaseState::Submitting,
            PurchaseState::Confirming,
            PurchaseState::Verifying,
            PurchaseState::Success { units: 3 },
            PurchaseState::Idle,
        ] {
            attempt.advance(next).expect("allowed");
        }
    }

    #[test]
    fn test_refusal_returns_to_idle() {
        let mut attempt = PurchaseAttempt::new("single", None);
        attempt.advance(PurchaseState::Building).expect("building");
        attempt.advance(PurchaseState::Signing).expect("signing");
        attempt.advance(PurchaseState::Idle).expect("refused");
        assert_eq!(attempt.state(), &PurchaseState::Idle);
    }

    #[test]
    fn test_confirming_cannot_be_abandoned() {
        assert!(!PurchaseState::Confirming.can_transition_to(&PurchaseState::Idle));
        assert!(!PurchaseState::Confirming.can_transition_to(&error()));
        assert!(PurchaseState::Confirming.can_transition_to(&PurchaseState::Verifying));
        assert!(!PurchaseState::Verifying.can_transition_to(&PurchaseState::Idle));
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut attempt = PurchaseAttempt::new("single", None);
        let err = attempt
            .advance(PurchaseState::Verifying)
            .expect_err("skipping ahead");
        assert_eq!(err.from, "idle");
        assert_eq!(err.to, "verifying");
        assert_eq!(attempt.state(), &PurchaseState::Idle);
    }

    #[test]
    fn test_preconditions_fail_straight_from_idle() {
        let mut attempt = PurchaseAttempt::new("single", None);
        attempt.advance(error()).expect("idle -> error");
        assert!(attempt.state().is_terminal());
        attempt.advance(PurchaseState::Idle).expect("user retry");
    }
}
