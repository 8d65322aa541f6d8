// lib.rs - Core library structure for the wallet facade

pub mod config_store;
pub mod crypto;
pub mod dto;
pub mod engine;
pub mod errors;
pub mod events;
pub mod node_client;
pub mod session;
pub mod storage;
pub mod validation;

// Re-export common types
pub use config_store::{ConfigStore, FeeConfig, NodeConfig, NotificationConfig, WalletConfig};
pub use dto::{
    AddressExpiration, ApplicationKind, ChangeAction, Currency, ExchangeRate, Notification,
    NotificationPayload, NotificationState, NotificationType, PaymentInfo, SystemState,
    TxDescription, TxFailureReason, TxId, TxStatus, Utxo, UtxoKeyType, UtxoStatus, VersionInfo,
    WalletAddress, WalletStatus, GRAINS_PER_MICA,
};
pub use errors::{WalletError, WalletResult};
pub use events::{NodeConnectionError, WalletEvent, WalletListener};
pub use session::WalletSession;
pub use storage::{StoreLock, StorePayload, StoreSecrets, WalletPaths, WalletStore};
pub use validation::{is_address_well_formed, InputValidator};
