//! Event catalogue and listener registration.
//!
//! Every asynchronous result or unsolicited state change reaches the
//! caller through exactly one of these events, delivered to the
//! session's registered listener on a dispatcher task. Delivery never
//! happens synchronously inside a request call, so a listener is free to
//! issue further requests without re-entering the session lock.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::dto::{
    ChangeAction, ExchangeRate, Notification, PaymentInfo, TxDescription, TxId, Utxo,
    WalletAddress, WalletStatus,
};

/// Connectivity failure reported by the node-connection-failed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeConnectionError {
    ConnectionRefused = 0,
    Timeout = 1,
    Protocol = 2,
    Unknown = 3,
}

impl NodeConnectionError {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WalletEvent {
    /// Balance/sync summary changed.
    Status(WalletStatus),
    /// Wallet-level resync progress; `total` may grow while in flight
    /// but `done <= total` holds at every emission.
    SyncProgress { done: u64, total: u64 },
    /// Underlying node sync progress, independent of the wallet channel.
    NodeSyncProgress { done: u64, total: u64 },
    /// Transaction list change; `Reset` carries the full set.
    TxStatus {
        action: ChangeAction,
        items: Vec<TxDescription>,
    },
    /// Complete current UTXO set; this stream has no change-kind and is
    /// always a full replacement.
    AllUtxoChanged { items: Vec<Utxo> },
    /// Response to an address-list request.
    Addresses {
        own: bool,
        items: Vec<WalletAddress>,
    },
    GeneratedNewAddress(WalletAddress),
    NewAddressFailed,
    /// Response to a change calculation.
    ChangeCalculated { change: u64 },
    NodeConnectedChanged { connected: bool },
    NodeConnectionFailed { error: NodeConnectionError },
    /// Dedicated rejection for a send targeting an expired receiver.
    CannotSendToExpired,
    PaymentProofExported { tx_id: TxId, proof: PaymentInfo },
    // Embedded-node supervision (restore path only).
    NodeStarted,
    NodeStopped,
    NodeFailedToStart,
    NodeThreadFinished,
    ImportRecoveryProgress { done: u64, total: u64 },
    ImportDataResult { success: bool },
    ExportDataResult { json: String },
    /// Notification stream change; each item selects its own payload
    /// variant through the notification's type discriminator.
    NotificationChanged {
        action: ChangeAction,
        items: Vec<Notification>,
    },
    /// Full replacement snapshot of the cached exchange rates.
    ExchangeRates { rates: Vec<ExchangeRate> },
}

/// Receives every event emitted by one wallet session.
pub trait WalletListener: Send + Sync {
    fn on_event(&self, event: WalletEvent);
}

impl<F> WalletListener for F
where
    F: Fn(WalletEvent) + Send + Sync,
{
    fn on_event(&self, event: WalletEvent) {
        self(event)
    }
}

/// One listener per session, swappable at runtime. Events emitted while
/// no listener is registered are dropped.
#[derive(Clone, Default)]
pub struct ListenerSlot {
    inner: Arc<RwLock<Option<Arc<dyn WalletListener>>>>,
}

impl ListenerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, listener: Arc<dyn WalletListener>) {
        *self.inner.write() = Some(listener);
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    pub fn deliver(&self, event: WalletEvent) {
        let listener = self.inner.read().clone();
        if let Some(listener) = listener {
            listener.on_event(event);
        }
    }
}
