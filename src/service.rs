//! Verification service lifecycle.

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::event::{create_event_channel, ServiceEvent, ServiceEventsChannel, ServiceEventsSender};
use crate::ledger::{JsonRpcLedger, LedgerRpc};
use crate::payment::{PaymentVerifier, PaymentVerifierConfig};
use crate::server::{create_router, AppState};
use crate::store::CreditStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

/// Builder for the verification service.
pub struct ServiceBuilder {
    config: ServiceConfig,
    ledger: Option<Arc<dyn LedgerRpc>>,
}

impl ServiceBuilder {
    /// Create a new builder with the given configuration.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            ledger: None,
        }
    }

    /// Use `ledger` instead of a JSON-RPC client for the configured URL.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerRpc>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Open the credit store and bind the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the treasury or catalog are invalid, the store
    /// cannot be opened or the listen address cannot be bound.
    pub async fn build(self) -> Result<RunningService> {
        info!("Building token-credit service with config: {:?}", self.config);

        std::fs::create_dir_all(&self.config.root_dir)?;

        let treasury = self.config.treasury_address()?;
        let catalog = Arc::new(self.config.catalog()?);

        let ledger: Arc<dyn LedgerRpc> = match self.ledger {
            Some(ledger) => ledger,
            None => {
                let client = JsonRpcLedger::new(self.config.ledger.client_config())?;
                info!("Using ledger RPC at {}", client.url());
                Arc::new(client)
            }
        };

        let store = CreditStore::open(self.config.store_path())?;
        info!(
            "Credit store at {} ({} signatures processed)",
            self.config.store_path().display(),
            store.processed_count()
        );

        let (events_tx, events_rx) = create_event_channel();
        let verifier = PaymentVerifier::new(
            PaymentVerifierConfig {
                treasury,
                cache_capacity: self.config.cache_capacity,
            },
            catalog,
            ledger,
            store,
        )
        .with_events(events_tx.clone());

        let listener = TcpListener::bind(self.config.listen).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(RunningService {
            config: self.config,
            listener: Some(listener),
            local_addr,
            verifier: Arc::new(verifier),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        })
    }
}

/// Requests shutdown of a [`RunningService`] from elsewhere.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Request the service to shut down.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// A bound verification service.
pub struct RunningService {
    config: ServiceConfig,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    verifier: Arc<PaymentVerifier>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: ServiceEventsSender,
    events_rx: Option<ServiceEventsChannel>,
}

impl RunningService {
    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the service's root directory.
    #[must_use]
    pub fn root_dir(&self) -> &PathBuf {
        &self.config.root_dir
    }

    /// The verification core.
    #[must_use]
    pub fn verifier(&self) -> &Arc<PaymentVerifier> {
        &self.verifier
    }

    /// Get a receiver for service events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<ServiceEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to service events.
    #[must_use]
    pub fn subscribe_events(&self) -> ServiceEventsChannel {
        self.events_tx.subscribe()
    }

    /// A handle that can stop the service while [`RunningService::run`] is awaited.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Serve HTTP until shutdown is requested or Ctrl-C is received.
    ///
    /// In-flight requests finish before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the service already ran or the server fails.
    pub async fn run(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::Config("service has already been run".to_string()))?;

        let router = create_router(AppState {
            verifier: Arc::clone(&self.verifier),
        });

        info!("Starting token-credit on {}", self.local_addr);
        let _ = self.events_tx.send(ServiceEvent::Started {
            listen: self.local_addr,
        });

        let mut shutdown_rx = self.shutdown_rx.clone();
        let shutdown_tx = Arc::clone(&self.shutdown_tx);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    () = shutdown_requested(&mut shutdown_rx) => {
                        info!("Shutdown signal received");
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Ctrl-C received, initiating shutdown");
                        let _ = shutdown_tx.send(true);
                    }
                }
            })
            .await?;

        let _ = self.events_tx.send(ServiceEvent::ShuttingDown);
        info!("Service shutdown complete");
        Ok(())
    }

    /// Request the service to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
