//! Clients for the verification service.

use crate::ledger::{Address, Signature};
use crate::payment::{PaymentVerifier, VerificationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Rejection category reported by the verification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The tier is not in the service's catalog.
    UnknownBundle,
    /// The ledger does not know the signature yet.
    NotFound,
    /// The transaction failed on-chain.
    OnChainError,
    /// The transaction pays for something else.
    MismatchedTransaction,
    /// The service could not reach the ledger.
    LedgerUnavailable,
    /// The service's credit store failed.
    Storage,
    /// The service itself could not be reached.
    Unreachable,
    /// Anything the client does not recognise.
    Other,
}

impl RejectionKind {
    const ALL: [Self; 8] = [
        Self::UnknownBundle,
        Self::NotFound,
        Self::OnChainError,
        Self::MismatchedTransaction,
        Self::LedgerUnavailable,
        Self::Storage,
        Self::Unreachable,
        Self::Other,
    ];

    /// Wire name, as sent in the `kind` field of an error body.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownBundle => "unknown_bundle",
            Self::NotFound => "not_found",
            Self::OnChainError => "on_chain_error",
            Self::MismatchedTransaction => "mismatched_transaction",
            Self::LedgerUnavailable => "ledger_unavailable",
            Self::Storage => "storage",
            Self::Unreachable => "unreachable",
            Self::Other => "other",
        }
    }

    /// Parse the wire name; unknown names map to [`RejectionKind::Other`].
    #[must_use]
    pub fn from_wire(kind: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == kind)
            .unwrap_or(Self::Other)
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed verification call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct Rejection {
    /// Category.
    pub kind: RejectionKind,
    /// Human-readable detail from the service.
    pub detail: String,
}

impl From<&VerificationError> for Rejection {
    fn from(error: &VerificationError) -> Self {
        Self {
            kind: RejectionKind::from_wire(error.kind()),
            detail: error.to_string(),
        }
    }
}

/// Asks the verification service to credit a submitted payment.
#[async_trait]
pub trait VerificationClient: Send + Sync {
    /// Returns the units credited for `signature`.
    async fn verify_payment(
        &self,
        payer: &Address,
        signature: &Signature,
        bundle_id: &str,
    ) -> Result<u64, Rejection>;
}

#[async_trait]
impl VerificationClient for PaymentVerifier {
    async fn verify_payment(
        &self,
        payer: &Address,
        signature: &Signature,
        bundle_id: &str,
    ) -> Result<u64, Rejection> {
        self.verify(payer, signature, bundle_id)
            .await
            .map(|credit| credit.units_credited)
            .map_err(|e| Rejection::from(&e))
    }
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    wallet: &'a Address,
    signature: &'a Signature,
    tier: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    credited: u64,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    kind: Option<String>,
}

/// Verification client speaking the service's HTTP API.
pub struct HttpVerificationClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVerificationClient {
    /// Create a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, request_timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/verify", base_url.trim_end_matches('/')),
        })
    }

    /// The `/verify` URL requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl VerificationClient for HttpVerificationClient {
    async fn verify_payment(
        &self,
        payer: &Address,
        signature: &Signature,
        bundle_id: &str,
    ) -> Result<u64, Rejection> {
        let unreachable = |detail: String| Rejection {
            kind: RejectionKind::Unreachable,
            detail,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&VerifyRequest {
                wallet: payer,
                signature,
                tier: bundle_id,
            })
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let status = response.status();
        debug!("POST {} -> {status}", self.endpoint);

        if status.is_success() {
            let body: VerifyResponse = response
                .json()
                .await
                .map_err(|e| unreachable(format!("malformed response: {e}")))?;
            return Ok(body.credited);
        }

        // Any non-success status is a rejection, whatever the body says
        Err(match response.json::<ErrorResponse>().await {
            Ok(body) => Rejection {
                kind: body
                    .kind
                    .as_deref()
                    .map_or(RejectionKind::Other, RejectionKind::from_wire),
                detail: body.error,
            },
            Err(_) => Rejection {
                kind: RejectionKind::Other,
                detail: format!("HTTP {status}"),
            },
        })
    }
}
