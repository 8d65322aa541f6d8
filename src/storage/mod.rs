pub mod paths;
pub mod store;

pub use paths::WalletPaths;
pub use store::{StoreLock, StorePayload, StoreSecrets, UnlockedStore, WalletStore};
