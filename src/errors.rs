use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalletError {
    // Cryptographic errors
    CryptoError(String),
    InvalidPhrase(String),
    SignatureError(String),

    // Network errors
    NetworkError(String),
    ConnectionTimeout,
    InvalidResponse(String),

    // Storage errors
    StorageError(String),
    NotFound(String),
    AlreadyExists(String),
    /// The store is already held by a live session. The lock file is
    /// released on close/drop; after a crash it must be cleared manually.
    StoreLocked(String),
    WrongPassword,

    // Validation errors
    ValidationError(String),
    InvalidAddress(String),
    InvalidAmount(String),

    // Application errors
    NotInitialized,
    SessionClosed,

    // Generic errors
    Unknown(String),
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WalletError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            WalletError::InvalidPhrase(msg) => write!(f, "Invalid mnemonic phrase: {}", msg),
            WalletError::SignatureError(msg) => write!(f, "Signature error: {}", msg),

            WalletError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            WalletError::ConnectionTimeout => write!(f, "Connection timeout"),
            WalletError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),

            WalletError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            WalletError::NotFound(msg) => write!(f, "Not found: {}", msg),
            WalletError::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            WalletError::StoreLocked(msg) => write!(f, "Store locked: {}", msg),
            WalletError::WrongPassword => write!(f, "Wrong wallet password"),

            WalletError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            WalletError::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),
            WalletError::InvalidAmount(msg) => write!(f, "Invalid amount: {}", msg),

            WalletError::NotInitialized => write!(f, "Wallet not initialized"),
            WalletError::SessionClosed => write!(f, "Wallet session is closed"),

            WalletError::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for WalletError {}

pub type WalletResult<T> = Result<T, WalletError>;

// Conversion helpers
impl From<std::io::Error> for WalletError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => WalletError::NotFound(error.to_string()),
            std::io::ErrorKind::AlreadyExists => WalletError::AlreadyExists(error.to_string()),
            _ => WalletError::StorageError(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(error: serde_json::Error) -> Self {
        WalletError::ValidationError(format!("JSON error: {}", error))
    }
}
