//! Value records crossing the session/engine boundary.
//!
//! Everything here is an immutable snapshot handed from the engine to the
//! caller; callers replace their cached view on receipt of a new event
//! instead of mutating items in place. The numeric discriminants on the
//! enums are a wire contract and must not be reordered.

use serde::{Deserialize, Serialize};

/// Base units per whole MICA.
pub const GRAINS_PER_MICA: u64 = 100_000_000;

/// Transaction identifier, hex encoded.
pub type TxId = String;

/// Classification of a collection mutation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeAction {
    Added = 0,
    Removed = 1,
    Updated = 2,
    /// The payload is the complete replacement set; discard any cached view.
    Reset = 3,
}

impl ChangeAction {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ChangeAction::Added),
            1 => Some(ChangeAction::Removed),
            2 => Some(ChangeAction::Updated),
            3 => Some(ChangeAction::Reset),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UtxoStatus {
    Unavailable = 0,
    Available = 1,
    Maturing = 2,
    Outgoing = 3,
    Incoming = 4,
    Spent = 5,
}

impl UtxoStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(UtxoStatus::Unavailable),
            1 => Some(UtxoStatus::Available),
            2 => Some(UtxoStatus::Maturing),
            3 => Some(UtxoStatus::Outgoing),
            4 => Some(UtxoStatus::Incoming),
            5 => Some(UtxoStatus::Spent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UtxoKeyType {
    Regular = 0,
    Coinbase = 1,
    Fee = 2,
    Change = 3,
}

impl UtxoKeyType {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(UtxoKeyType::Regular),
            1 => Some(UtxoKeyType::Coinbase),
            2 => Some(UtxoKeyType::Fee),
            3 => Some(UtxoKeyType::Change),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Pending = 0,
    InProgress = 1,
    Cancelled = 2,
    Completed = 3,
    Failed = 4,
    Registering = 5,
}

impl TxStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(TxStatus::Pending),
            1 => Some(TxStatus::InProgress),
            2 => Some(TxStatus::Cancelled),
            3 => Some(TxStatus::Completed),
            4 => Some(TxStatus::Failed),
            5 => Some(TxStatus::Registering),
            _ => None,
        }
    }

    /// Terminal transactions can no longer be cancelled.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TxStatus::Cancelled | TxStatus::Completed | TxStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxFailureReason {
    Unknown = 0,
    NoInputs = 1,
    ExpiredReceiver = 2,
    Rejected = 3,
}

/// Address expiration policy requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressExpiration {
    Expired = 0,
    OneDay = 1,
    Never = 2,
    AsIs = 3,
    Auto = 4,
}

impl AddressExpiration {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(AddressExpiration::Expired),
            1 => Some(AddressExpiration::OneDay),
            2 => Some(AddressExpiration::Never),
            3 => Some(AddressExpiration::AsIs),
            4 => Some(AddressExpiration::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationState {
    Unread = 0,
    Read = 1,
    Deleted = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationType {
    SoftwareUpdate = 0,
    AddressStatusChanged = 1,
    TransactionCompleted = 2,
    TransactionFailed = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    Mica = 0,
    Usd = 1,
    Btc = 2,
    Unknown = 3,
}

impl Currency {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Currency::Mica,
            1 => Currency::Usd,
            2 => Currency::Btc,
            _ => Currency::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationKind {
    Desktop = 0,
    Android = 1,
    Ios = 2,
    Unknown = 3,
}

/// Chain-state snapshot embedded in the wallet status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemState {
    pub height: u64,
    pub hash: String,
}

/// Balance and sync summary delivered by the status event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStatus {
    pub available: u64,
    pub receiving: u64,
    pub sending: u64,
    pub maturing: u64,
    pub sync_done: u64,
    pub sync_total: u64,
    pub system: SystemState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub id: u64,
    /// Stable string identifier, unique across the wallet's lifetime.
    pub string_id: String,
    pub amount: u64,
    pub status: UtxoStatus,
    /// Height at which the output becomes spendable.
    pub maturity: u64,
    pub key_type: UtxoKeyType,
    pub confirm_height: u64,
    #[serde(default)]
    pub create_tx_id: Option<TxId>,
    #[serde(default)]
    pub spent_tx_id: Option<TxId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxDescription {
    pub id: TxId,
    pub amount: u64,
    pub fee: u64,
    pub change: u64,
    pub min_height: u64,
    /// Counterparty wallet identifier.
    pub peer_id: String,
    pub my_id: String,
    pub message: String,
    /// Seconds since epoch.
    pub create_time: i64,
    pub modify_time: i64,
    pub sender: bool,
    pub status: TxStatus,
    #[serde(default)]
    pub failure_reason: Option<TxFailureReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAddress {
    /// Opaque identity token, hex encoded.
    pub wallet_id: String,
    /// Display form of the address (bech32).
    pub address: String,
    pub label: String,
    pub category: String,
    pub create_time: i64,
    /// Seconds until expiration from `create_time`; 0 means never expires.
    pub duration: i64,
    pub own: bool,
}

impl WalletAddress {
    pub fn is_expired(&self, now: i64) -> bool {
        self.duration != 0 && self.create_time + self.duration <= now
    }
}

/// Verified payment proof, bound to one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: u64,
    pub kernel_id: String,
    pub is_valid: bool,
    pub raw_proof: String,
}

/// Fixed-point quote: `amount` is the price of one whole unit of
/// `currency` in `unit`, scaled by 10^8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    pub currency: Currency,
    pub unit: Currency,
    pub amount: u64,
    pub updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub application: ApplicationKind,
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
}

/// Variant payload carried by a notification, selected by the
/// notification's own type discriminator rather than by the event name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum NotificationPayload {
    Version(VersionInfo),
    Address(WalletAddress),
    Transaction(TxDescription),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub notification_type: NotificationType,
    pub state: NotificationState,
    pub create_time: i64,
    pub payload: NotificationPayload,
}
