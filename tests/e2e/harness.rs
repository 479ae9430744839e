//! Test harness that runs the verification service against an in-memory ledger.
//!
//! The `TestHarness` spawns the real HTTP service on an ephemeral port, backed
//! by an `InMemoryLedger` the test can fund and misconfigure, and hands out
//! payer agents that reach the service over HTTP.

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use token_credit::ledger::{Address, InMemoryLedger, Signature, SignedTransaction, UnsignedTransfer};
use token_credit::payer::{HttpVerificationClient, SignError, Signer};
use token_credit::{Catalog, PayerAgent, PayerConfig, ServiceBuilder, ServiceConfig, ShutdownHandle};
use tracing::info;

/// Error type for test harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Service error
    #[error("Service error: {0}")]
    Service(#[from] token_credit::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Test harness that manages the service and its ledger.
pub struct TestHarness {
    ledger: Arc<InMemoryLedger>,
    treasury: Address,
    addr: SocketAddr,
    http: reqwest::Client,
    shutdown: ShutdownHandle,
    task: JoinHandle<token_credit::Result<()>>,
    _root: TempDir,
}

impl TestHarness {
    /// Start the service on an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails to start.
    pub async fn setup() -> Result<Self> {
        let root = tempfile::tempdir()?;
        let ledger = Arc::new(InMemoryLedger::new());
        let treasury = Address::from_bytes([0xEE; 32]);

        let config = ServiceConfig {
            root_dir: root.path().to_path_buf(),
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            treasury: Some(treasury.to_string()),
            ..Default::default()
        };

        let mut service = ServiceBuilder::new(config)
            .with_ledger(ledger.clone())
            .build()
            .await?;
        let addr = service.local_addr();
        let shutdown = service.shutdown_handle();
        let task = tokio::spawn(async move { service.run().await });

        info!("Test service listening on {addr}");

        Ok(Self {
            ledger,
            treasury,
            addr,
            http: reqwest::Client::new(),
            shutdown,
            task,
            _root: root,
        })
    }

    /// The in-memory ledger behind the service.
    #[must_use]
    pub fn ledger(&self) -> &Arc<InMemoryLedger> {
        &self.ledger
    }

    /// Treasury the service expects payments to.
    #[must_use]
    pub fn treasury(&self) -> &Address {
        &self.treasury
    }

    /// Base URL of the service.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// A fresh account holding `lamports`.
    #[must_use]
    pub fn funded_account(&self, lamports: u64) -> Address {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes[..]);
        let address = Address::from_bytes(bytes);
        self.ledger.fund(&address, lamports);
        address
    }

    /// A payer agent for `wallet` using short timings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn agent(&self, wallet: TestWallet, config: PayerConfig) -> Result<PayerAgent> {
        let client = HttpVerificationClient::new(&self.base_url(), config.request_timeout())?;
        Ok(PayerAgent::new(
            config,
            Arc::new(Catalog::default()),
            Arc::new(wallet),
            Arc::new(client),
        )
        .with_ledger(self.ledger.clone())
        .with_recipient(self.treasury.clone()))
    }

    /// `POST /verify` and return the status code and JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn post_verify(
        &self,
        wallet: &Address,
        signature: &Signature,
        tier: &str,
    ) -> Result<(u16, Value)> {
        let response = self
            .http
            .post(format!("{}/verify", self.base_url()))
            .json(&json!({"wallet": wallet, "signature": signature, "tier": tier}))
            .send()
            .await?;
        let status = response.status().as_u16();
        Ok((status, response.json().await?))
    }

    /// `GET /balance/:address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn balance(&self, address: &Address) -> Result<u64> {
        let body: Value = self
            .http
            .get(format!("{}/balance/{address}", self.base_url()))
            .send()
            .await?
            .json()
            .await?;
        Ok(body["balance"].as_u64().unwrap_or_default())
    }

    /// `GET /health`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn health(&self) -> Result<Value> {
        Ok(self
            .http
            .get(format!("{}/health", self.base_url()))
            .send()
            .await?
            .json()
            .await?)
    }

    /// Stop the service and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the service failed while running.
    pub async fn teardown(self) -> Result<()> {
        self.shutdown.shutdown();
        if let Ok(result) = self.task.await {
            result?;
        }
        Ok(())
    }
}

/// Payer timings short enough for tests.
#[must_use]
pub fn fast_payer_config() -> PayerConfig {
    PayerConfig {
        poll_interval_ms: 50,
        confirm_timeout_secs: 1,
        grace_period_secs: 1,
        request_timeout_secs: 5,
        ..Default::default()
    }
}

/// A wallet that signs with random signatures unless told to refuse.
pub struct TestWallet {
    identity: Option<Address>,
    refuse: bool,
}

impl TestWallet {
    /// A connected wallet for `identity`.
    #[must_use]
    pub fn new(identity: &Address) -> Self {
        Self {
            identity: Some(identity.clone()),
            refuse: false,
        }
    }

    /// A wallet whose user declines every request.
    #[must_use]
    pub fn refusing(identity: &Address) -> Self {
        Self {
            identity: Some(identity.clone()),
            refuse: true,
        }
    }
}

#[async_trait]
impl Signer for TestWallet {
    fn identity(&self) -> Option<Address> {
        self.identity.clone()
    }

    async fn sign(&self, transfer: UnsignedTransfer) -> std::result::Result<SignedTransaction, SignError> {
        if self.refuse {
            return Err(SignError::UserRefused);
        }
        let mut bytes = [0u8; 64];
        rand::thread_rng().fill(&mut bytes[..]);
        Ok(SignedTransaction {
            transfer,
            signature: Signature::from_bytes(bytes),
            wire: Vec::new(),
        })
    }
}
