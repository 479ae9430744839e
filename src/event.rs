//! Service event system.

use crate::ledger::{Address, Signature};
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// Events emitted by the verification service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// HTTP listener is accepting requests.
    Started {
        /// Bound address.
        listen: SocketAddr,
    },

    /// Service is shutting down.
    ShuttingDown,

    /// A signature was verified and its units credited.
    Credited {
        /// Transaction signature.
        signature: Signature,
        /// Credited account.
        payer: Address,
        /// Units added.
        units: u64,
    },

    /// A verification call hit an already-processed signature.
    Replayed {
        /// Transaction signature.
        signature: Signature,
    },

    /// A verification call was rejected.
    Rejected {
        /// Transaction signature.
        signature: Signature,
        /// Why.
        reason: String,
    },
}

/// Channel for receiving service events.
pub type ServiceEventsChannel = broadcast::Receiver<ServiceEvent>;

/// Sender for service events.
pub type ServiceEventsSender = broadcast::Sender<ServiceEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (ServiceEventsSender, ServiceEventsChannel) {
    broadcast::channel(256)
}
