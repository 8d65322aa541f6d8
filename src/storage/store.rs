//! Encrypted wallet store.
//!
//! The store file seals the whole wallet data set (seed, addresses,
//! transactions, UTXOs, notifications) under a passphrase-derived key:
//! Argon2id for key derivation, AES-256-GCM for sealing, a BLAKE3
//! checksum over the plaintext for integrity, and write-new-then-rename
//! for atomic replacement. Opening caches the derived key so subsequent
//! flushes re-seal without re-running the KDF; only a password change
//! re-derives.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use argon2::{Algorithm, Argon2, Params, Version};
use blake3::Hasher as Blake3;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::dto::{Notification, SystemState, TxDescription, Utxo, WalletAddress};
use crate::errors::{WalletError, WalletResult};

const STORE_MAGIC: &[u8; 8] = b"MICAWLT1";
const STORE_VERSION: u16 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Secret material sealed inside the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct StoreSecrets {
    /// Mnemonic phrase kept for recovery display.
    pub mnemonic_phrase: Option<String>,
    /// Wallet seed derived from the mnemonic.
    pub seed_bytes: Vec<u8>,
}

/// Complete persisted wallet state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorePayload {
    pub secrets: StoreSecrets,
    pub addresses: Vec<WalletAddress>,
    pub transactions: Vec<TxDescription>,
    pub utxos: Vec<Utxo>,
    pub notifications: Vec<Notification>,
    pub chain: SystemState,
    pub next_utxo_id: u64,
    pub next_address_index: u64,
}

impl StorePayload {
    pub fn new(secrets: StoreSecrets) -> Self {
        Self {
            secrets,
            addresses: Vec::new(),
            transactions: Vec::new(),
            utxos: Vec::new(),
            notifications: Vec::new(),
            chain: SystemState {
                height: 0,
                hash: String::new(),
            },
            next_utxo_id: 1,
            next_address_index: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFile {
    magic: [u8; 8],
    version: u16,
    nonce: [u8; NONCE_LEN],
    kdf: KdfParameters,
    checksum: [u8; 32],
    ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KdfParameters {
    m_cost_kib: u32,
    t_cost: u32,
    p_cost: u32,
    salt: [u8; SALT_LEN],
}

impl Default for KdfParameters {
    fn default() -> Self {
        Self {
            m_cost_kib: 64 * 1024, // 64 MiB
            t_cost: 3,
            p_cost: 1,
            salt: [0u8; SALT_LEN],
        }
    }
}

/// Handles creation and opening of the encrypted store file.
#[derive(Debug, Clone)]
pub struct WalletStore {
    store_path: PathBuf,
}

impl WalletStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            store_path: path.as_ref().to_path_buf(),
        }
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Check if the store file exists on disk.
    pub fn exists(&self) -> bool {
        self.store_path.exists()
    }

    /// Create a new encrypted store on disk. Fails if one already exists.
    pub fn create(
        &self,
        password: &SecretString,
        payload: &StorePayload,
    ) -> WalletResult<UnlockedStore> {
        if self.exists() {
            return Err(WalletError::AlreadyExists(
                self.store_path.display().to_string(),
            ));
        }

        let mut kdf = KdfParameters::default();
        OsRng.fill_bytes(&mut kdf.salt);
        let key = derive_key(password, &kdf)?;

        let unlocked = UnlockedStore {
            store_path: self.store_path.clone(),
            key,
            kdf,
        };
        unlocked.flush(payload)?;
        Ok(unlocked)
    }

    /// Unlock the store and return the decrypted payload.
    pub fn open(&self, password: &SecretString) -> WalletResult<(UnlockedStore, StorePayload)> {
        if !self.exists() {
            return Err(WalletError::NotFound(
                self.store_path.display().to_string(),
            ));
        }

        let store_file = self.read_store_file()?;
        let key = derive_key(password, &store_file.kdf)?;

        let nonce = Nonce::assume_unique_for_key(store_file.nonce);
        let plaintext = decrypt_aes_gcm(&key, nonce, &store_file.ciphertext)
            .map_err(|_| WalletError::WrongPassword)?;

        if blake3_checksum(&plaintext) != store_file.checksum {
            return Err(WalletError::ValidationError(
                "Store integrity verification failed".to_string(),
            ));
        }

        let payload: StorePayload = serde_json::from_slice(&plaintext)?;
        let unlocked = UnlockedStore {
            store_path: self.store_path.clone(),
            key,
            kdf: store_file.kdf,
        };
        Ok((unlocked, payload))
    }

    fn read_store_file(&self) -> WalletResult<StoreFile> {
        let bytes = fs::read(&self.store_path)?;
        let store_file: StoreFile = serde_json::from_slice(&bytes)?;

        if &store_file.magic != STORE_MAGIC {
            return Err(WalletError::ValidationError(
                "Invalid store magic marker".to_string(),
            ));
        }

        if store_file.version != STORE_VERSION {
            return Err(WalletError::ValidationError(format!(
                "Unsupported store version: {}",
                store_file.version
            )));
        }

        Ok(store_file)
    }
}

/// An open store with its sealing key in memory.
pub struct UnlockedStore {
    store_path: PathBuf,
    key: Zeroizing<[u8; KEY_LEN]>,
    kdf: KdfParameters,
}

impl UnlockedStore {
    /// Re-seal and persist the payload atomically, reusing the cached key.
    pub fn flush(&self, payload: &StorePayload) -> WalletResult<()> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let plaintext = Zeroizing::new(serde_json::to_vec(payload)?);
        let checksum = blake3_checksum(&plaintext);
        let ciphertext = encrypt_aes_gcm(&self.key, nonce, &plaintext)?;

        let store_file = StoreFile {
            magic: *STORE_MAGIC,
            version: STORE_VERSION,
            nonce: nonce_bytes,
            kdf: self.kdf.clone(),
            checksum,
            ciphertext,
        };

        let serialized = serde_json::to_vec(&store_file)?;
        let mut file = create_atomic_file(&self.store_path)?;
        file.write_all(&serialized)?;
        file.sync_all()?;
        finalize_atomic_file(file, &self.store_path)?;
        Ok(())
    }

    /// Re-derive the sealing key from a new password and persist.
    pub fn change_password(
        &mut self,
        new_password: &SecretString,
        payload: &StorePayload,
    ) -> WalletResult<()> {
        let mut kdf = KdfParameters::default();
        OsRng.fill_bytes(&mut kdf.salt);
        let key = derive_key(new_password, &kdf)?;

        self.key = key;
        self.kdf = kdf;
        self.flush(payload)
    }
}

impl std::fmt::Debug for UnlockedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedStore")
            .field("store_path", &self.store_path)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Exclusive ownership marker for one wallet store.
///
/// Acquiring the lock creates the lock file with `create_new`; a second
/// session on the same store fails with `StoreLocked`. Dropping the
/// guard removes the file.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    pub fn acquire(path: impl AsRef<Path>) -> WalletResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    WalletError::StoreLocked(path.display().to_string())
                } else {
                    WalletError::StorageError(e.to_string())
                }
            })?;
        let _ = write!(file, "{}", std::process::id());

        Ok(Self { path })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn derive_key(
    password: &SecretString,
    params: &KdfParameters,
) -> WalletResult<Zeroizing<[u8; KEY_LEN]>> {
    let argon_params = Params::new(
        params.m_cost_kib,
        params.t_cost,
        params.p_cost,
        Some(KEY_LEN),
    )
    .map_err(|e| WalletError::CryptoError(format!("Invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new_with_secret(&[], Algorithm::Argon2id, Version::V0x13, argon_params)
        .map_err(|e| WalletError::CryptoError(format!("Failed to init Argon2: {e}")))?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(
            password.expose_secret().as_bytes(),
            &params.salt,
            key.as_mut(),
        )
        .map_err(|e| WalletError::CryptoError(format!("KDF failed: {e}")))?;
    Ok(key)
}

fn encrypt_aes_gcm(
    key: &Zeroizing<[u8; KEY_LEN]>,
    nonce: Nonce,
    plaintext: &[u8],
) -> WalletResult<Vec<u8>> {
    let unbound_key = UnboundKey::new(&aead::AES_256_GCM, key.as_ref())
        .map_err(|e| WalletError::CryptoError(format!("Invalid encryption key: {e}")))?;
    let key = LessSafeKey::new(unbound_key);

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| WalletError::CryptoError("Encryption failure".to_string()))?;
    Ok(in_out)
}

fn decrypt_aes_gcm(
    key: &Zeroizing<[u8; KEY_LEN]>,
    nonce: Nonce,
    ciphertext: &[u8],
) -> WalletResult<Zeroizing<Vec<u8>>> {
    let unbound_key = UnboundKey::new(&aead::AES_256_GCM, key.as_ref())
        .map_err(|e| WalletError::CryptoError(format!("Invalid encryption key: {e}")))?;
    let key = LessSafeKey::new(unbound_key);

    if ciphertext.len() < aead::AES_256_GCM.tag_len() {
        return Err(WalletError::CryptoError(
            "Ciphertext shorter than authentication tag".to_string(),
        ));
    }

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| WalletError::CryptoError("Decryption failure".to_string()))?;
    let plaintext_len = plaintext.len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

fn blake3_checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake3::new();
    hasher.update(data);
    let mut output = [0u8; 32];
    output.copy_from_slice(hasher.finalize().as_bytes());
    output
}

fn create_atomic_file(path: &Path) -> WalletResult<File> {
    let dir = path
        .parent()
        .ok_or_else(|| WalletError::StorageError("Invalid store path".to_string()))?;
    fs::create_dir_all(dir)?;
    let tmp_path = path.with_extension("new");
    Ok(File::create(&tmp_path)?)
}

fn finalize_atomic_file(mut file: File, final_path: &Path) -> WalletResult<()> {
    file.flush()?;
    drop(file);
    let tmp_path = final_path.with_extension("new");
    fs::rename(tmp_path, final_path)?;
    Ok(())
}
