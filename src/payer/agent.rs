//! The purchase flow.

use crate::catalog::{Bundle, Catalog};
use crate::ledger::{
    Address, JsonRpcLedger, JsonRpcLedgerConfig, LedgerRpc, Signature, UnsignedTransfer,
};
use crate::payer::client::{HttpVerificationClient, VerificationClient};
use crate::payer::error::{MissingDependency, PurchaseError};
use crate::payer::signer::{SignError, Signer};
use crate::payer::state::{PurchaseAttempt, PurchaseState};
use crate::payer::PayerConfig;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

/// How a purchase ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// Units were credited.
    Credited {
        /// Units credited.
        units: u64,
        /// Signature of the payment.
        signature: Signature,
    },
    /// The user declined to sign. Nothing was submitted.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    Settled,
    Failed,
    TimedOut,
}

/// Runs purchases for one wallet, one at a time.
pub struct PayerAgent {
    config: PayerConfig,
    catalog: Arc<Catalog>,
    signer: Arc<dyn Signer>,
    verifier: Arc<dyn VerificationClient>,
    ledger: Option<Arc<dyn LedgerRpc>>,
    recipient: Option<Address>,
    attempt: Option<PurchaseAttempt>,
    state_tx: watch::Sender<PurchaseState>,
}

impl PayerAgent {
    /// Create an agent with no ledger and no recipient yet.
    #[must_use]
    pub fn new(
        config: PayerConfig,
        catalog: Arc<Catalog>,
        signer: Arc<dyn Signer>,
        verifier: Arc<dyn VerificationClient>,
    ) -> Self {
        let (state_tx, _) = watch::channel(PurchaseState::Idle);
        Self {
            config,
            catalog,
            signer,
            verifier,
            ledger: None,
            recipient: None,
            attempt: None,
            state_tx,
        }
    }

    /// Build an agent from configuration, talking to the ledger over JSON-RPC
    /// and to the verification service over HTTP.
    ///
    /// A missing RPC endpoint or recipient is not an error here; purchases
    /// fail with [`PurchaseError::ServiceUnavailable`] instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the recipient is not a valid address or an HTTP
    /// client cannot be built.
    pub fn from_config(
        config: PayerConfig,
        catalog: Arc<Catalog>,
        signer: Arc<dyn Signer>,
    ) -> crate::Result<Self> {
        let verifier = HttpVerificationClient::new(&config.verify_url, config.request_timeout())?;

        let ledger = config
            .rpc_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| {
                JsonRpcLedger::new(JsonRpcLedgerConfig {
                    url: url.to_string(),
                    request_timeout: config.request_timeout(),
                    ..Default::default()
                })
            })
            .transpose()?;

        let recipient = config
            .recipient
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                raw.parse::<Address>().map_err(|e| {
                    crate::Error::Config(format!("invalid recipient address {raw}: {e}"))
                })
            })
            .transpose()?;

        let mut agent = Self::new(config, catalog, signer, Arc::new(verifier));
        if let Some(ledger) = ledger {
            agent = agent.with_ledger(Arc::new(ledger));
        }
        if let Some(recipient) = recipient {
            agent = agent.with_recipient(recipient);
        }
        Ok(agent)
    }

    /// Use `ledger` for balances, submission and polling.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerRpc>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Send payments to `recipient`.
    #[must_use]
    pub fn with_recipient(mut self, recipient: Address) -> Self {
        self.recipient = Some(recipient);
        self
    }

    /// Follow state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PurchaseState> {
        self.state_tx.subscribe()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PurchaseState {
        self.state_tx.borrow().clone()
    }

    /// The current or last finished attempt.
    #[must_use]
    pub fn attempt(&self) -> Option<&PurchaseAttempt> {
        self.attempt.as_ref()
    }

    /// Drop the finished attempt and return to idle.
    pub fn reset(&mut self) {
        if let Some(mut attempt) = self.attempt.take() {
            if attempt.advance(PurchaseState::Idle).is_err() {
                if let Some(signature) = &attempt.signature {
                    warn!(
                        "Discarding unfinished purchase ({}) with signature {signature}",
                        attempt.state()
                    );
                }
            }
        }
        self.state_tx.send_replace(PurchaseState::Idle);
    }

    /// Buy `bundle_id`.
    ///
    /// A finished previous attempt is reset first. Once the transfer has been
    /// submitted the purchase always runs to `success` or `error`; the only
    /// exit back to `idle` is the user refusing to sign.
    ///
    /// # Errors
    ///
    /// Returns the [`PurchaseError`] the attempt ended with. Errors raised
    /// after submission carry the signature.
    pub async fn purchase(&mut self, bundle_id: &str) -> Result<PurchaseOutcome, PurchaseError> {
        self.reset();

        let result = self.run(bundle_id).await;
        match &result {
            Ok(PurchaseOutcome::Cancelled) => self.attempt = None,
            Ok(PurchaseOutcome::Credited { .. }) => {}
            Err(error) => {
                warn!("Purchase of {bundle_id} failed: {error}");
                if let Err(e) = self.advance(PurchaseState::Error(error.clone())) {
                    warn!("Could not record purchase failure: {e}");
                }
            }
        }
        result
    }

    async fn run(&mut self, bundle_id: &str) -> Result<PurchaseOutcome, PurchaseError> {
        let payer = self.signer.identity();
        self.attempt = Some(PurchaseAttempt::new(bundle_id, payer.clone()));

        let payer = payer.ok_or(PurchaseError::ServiceUnavailable {
            missing: MissingDependency::Wallet,
        })?;
        let recipient = self
            .recipient
            .clone()
            .ok_or(PurchaseError::ServiceUnavailable {
                missing: MissingDependency::Recipient,
            })?;
        let ledger = self
            .ledger
            .clone()
            .ok_or(PurchaseError::ServiceUnavailable {
                missing: MissingDependency::RpcEndpoint,
            })?;
        let bundle = self
            .catalog
            .get(bundle_id)
            .cloned()
            .ok_or_else(|| PurchaseError::UnknownBundle(bundle_id.to_string()))?;

        self.advance(PurchaseState::Building)?;
        let transfer = self
            .build_transfer(ledger.as_ref(), payer.clone(), recipient, &bundle)
            .await?;

        self.advance(PurchaseState::Signing)?;
        let signed = match self.signer.sign(transfer).await {
            Ok(signed) => signed,
            Err(SignError::UserRefused) => {
                info!("Signature request for {bundle_id} refused");
                self.advance(PurchaseState::Idle)?;
                return Ok(PurchaseOutcome::Cancelled);
            }
            Err(e @ SignError::Failed(_)) => return Err(PurchaseError::Unknown(e.to_string())),
        };

        self.advance(PurchaseState::Submitting)?;
        let signature = ledger
            .submit_transaction(&signed)
            .await
            .map_err(PurchaseError::SubmissionFailed)?;
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.signature = Some(signature.clone());
        }
        info!("Submitted {signature} for {} ({} SOL)", bundle.id, bundle.price_sol());

        self.advance(PurchaseState::Confirming)?;
        let confirmation = self.confirm(ledger.as_ref(), &signature).await;

        self.advance(PurchaseState::Verifying)?;
        let units = self
            .verify(&payer, &signature, &bundle.id, confirmation)
            .await?;

        self.advance(PurchaseState::Success { units })?;
        Ok(PurchaseOutcome::Credited { units, signature })
    }

    async fn build_transfer(
        &self,
        ledger: &dyn LedgerRpc,
        payer: Address,
        recipient: Address,
        bundle: &Bundle,
    ) -> Result<UnsignedTransfer, PurchaseError> {
        let available = ledger
            .get_balance(&payer)
            .await
            .map_err(PurchaseError::SubmissionFailed)?;

        let fee_reserve = self.config.fee_reserve_lamports;
        if available < bundle.price_lamports.saturating_add(fee_reserve) {
            return Err(PurchaseError::InsufficientFunds {
                required: bundle.price_lamports,
                available,
                fee_reserve,
            });
        }

        let checkpoint = ledger
            .latest_checkpoint()
            .await
            .map_err(PurchaseError::SubmissionFailed)?;
        debug!(
            "Built transfer of {} lamports from {payer} at {}",
            bundle.price_lamports, checkpoint.blockhash
        );

        Ok(UnsignedTransfer {
            payer,
            recipient,
            lamports: bundle.price_lamports,
            checkpoint,
        })
    }

    /// Poll until settled, failed or out of time. Bounded by time only.
    async fn confirm(&self, ledger: &dyn LedgerRpc, signature: &Signature) -> Confirmation {
        let deadline = Instant::now() + self.config.confirm_timeout();
        let interval = self.config.poll_interval();

        let poll = async {
            loop {
                match ledger.signature_statuses(std::slice::from_ref(signature)).await {
                    Ok(statuses) => match statuses.into_iter().next().flatten() {
                        Some(status) if status.has_failed() => return Confirmation::Failed,
                        Some(status) if status.is_settled() => return Confirmation::Settled,
                        Some(status) => {
                            debug!("{signature} at {}", status.confirmation.as_str());
                        }
                        None => debug!("{signature} not visible yet"),
                    },
                    Err(e) => warn!("Status poll for {signature} failed: {e}"),
                }
                sleep(interval).await;
            }
        };

        let confirmation = timeout_at(deadline, poll)
            .await
            .unwrap_or(Confirmation::TimedOut);
        match confirmation {
            Confirmation::Settled => info!("{signature} confirmed"),
            Confirmation::Failed => warn!("{signature} reported an on-chain error"),
            Confirmation::TimedOut => {
                info!("{signature} not confirmed in time, verifying anyway");
            }
        }
        confirmation
    }

    /// Ask the service, retrying once after the grace period.
    ///
    /// After an on-chain error was observed the grace period comes first and
    /// there is no retry.
    async fn verify(
        &self,
        payer: &Address,
        signature: &Signature,
        bundle_id: &str,
        confirmation: Confirmation,
    ) -> Result<u64, PurchaseError> {
        let grace = self.config.grace_period();
        let attempts = if confirmation == Confirmation::Failed {
            sleep(grace).await;
            1
        } else {
            2
        };

        let mut attempt = 1;
        loop {
            match self
                .verifier
                .verify_payment(payer, signature, bundle_id)
                .await
            {
                Ok(units) => {
                    info!("{signature} credited {units} units");
                    return Ok(units);
                }
                Err(rejection) if attempt < attempts => {
                    warn!("Verification of {signature} failed ({rejection}), retrying in {grace:?}");
                    sleep(grace).await;
                    attempt += 1;
                }
                Err(rejection) => {
                    return Err(PurchaseError::VerificationFailed {
                        signature: signature.clone(),
                        kind: rejection.kind,
                        detail: rejection.detail,
                    })
                }
            }
        }
    }

    fn advance(&mut self, next: PurchaseState) -> Result<(), PurchaseError> {
        let attempt = self
            .attempt
            .as_mut()
            .ok_or_else(|| PurchaseError::Unknown("no purchase in progress".to_string()))?;
        attempt
            .advance(next)
            .map_err(|e| PurchaseError::Unknown(e.to_string()))?;
        debug!("Purchase of {} now {}", attempt.bundle_id, attempt.state());
        self.state_tx.send_replace(attempt.state().clone());
        Ok(())
    }
}
