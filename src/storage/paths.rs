use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{WalletError, WalletResult};

/// Manages filesystem paths used by one wallet store.
#[derive(Debug, Clone)]
pub struct WalletPaths {
    /// Root directory for wallet data.
    root_dir: PathBuf,
    /// Encrypted store file path.
    store_file: PathBuf,
    /// Exclusive-ownership lock file.
    lock_file: PathBuf,
    /// Path to persisted wallet configuration.
    config_file: PathBuf,
}

impl WalletPaths {
    /// Store file name used on disk.
    pub const DEFAULT_STORE_FILENAME: &'static str = "wallet.store";
    /// Lock file marking the store as owned by a live session.
    pub const LOCK_FILENAME: &'static str = "wallet.lock";

    /// Create a new path manager rooted at the provided directory.
    pub fn new(root: impl AsRef<Path>) -> WalletResult<Self> {
        let root_dir = root.as_ref().to_path_buf();
        if root_dir.as_os_str().is_empty() {
            return Err(WalletError::StorageError(
                "Wallet root directory cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            store_file: root_dir.join(Self::DEFAULT_STORE_FILENAME),
            lock_file: root_dir.join(Self::LOCK_FILENAME),
            config_file: root_dir.join("wallet.config"),
            root_dir,
        })
    }

    /// Ensure the directory structure exists, creating missing folders.
    pub fn ensure_directories(&self) -> WalletResult<()> {
        fs::create_dir_all(&self.root_dir)?;
        Ok(())
    }

    /// Absolute path to the encrypted store file.
    pub fn store_file(&self) -> &Path {
        &self.store_file
    }

    /// Path to the session lock file.
    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    /// Path to persisted wallet configuration file.
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Root directory for all wallet-managed data.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn paths_are_rooted_under_the_given_directory() {
        let temp_dir = TempDir::new().unwrap();
        let paths = WalletPaths::new(temp_dir.path()).unwrap();

        assert_eq!(
            paths.store_file(),
            temp_dir.path().join(WalletPaths::DEFAULT_STORE_FILENAME)
        );
        assert_eq!(
            paths.lock_file(),
            temp_dir.path().join(WalletPaths::LOCK_FILENAME)
        );
        assert_eq!(paths.config_file(), temp_dir.path().join("wallet.config"));
        assert_eq!(paths.root_dir(), temp_dir.path());
    }

    #[test]
    fn empty_root_directory_rejected() {
        let result = WalletPaths::new("");
        assert!(matches!(result, Err(WalletError::StorageError(_))));
    }

    #[test]
    fn ensure_directories_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("wallets").join("primary");
        let paths = WalletPaths::new(&nested).unwrap();
        paths.ensure_directories().unwrap();
        assert!(nested.exists());
    }
}
