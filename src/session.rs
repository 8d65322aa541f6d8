//! Caller-facing wallet session.
//!
//! One `WalletSession` owns one open wallet store, the engine worker
//! task, and the event dispatcher. Request methods are fire-and-forget:
//! they validate caller-correctable input synchronously, enqueue an
//! engine request, and return; results arrive through the registered
//! listener. The synchronous probes never touch the engine and never
//! emit events.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config_store::ConfigStore;
use crate::crypto;
use crate::dto::{AddressExpiration, NotificationType, PaymentInfo, TxId, WalletAddress};
use crate::engine::data::WalletData;
use crate::engine::{Engine, EngineRequest};
use crate::errors::{WalletError, WalletResult};
use crate::events::{ListenerSlot, WalletListener};
use crate::storage::{StoreLock, StorePayload, StoreSecrets, UnlockedStore, WalletPaths, WalletStore};
use crate::validation::{is_address_well_formed, InputValidator};

struct PasswordProbe {
    salt: [u8; 16],
    hash: [u8; 32],
}

impl PasswordProbe {
    fn new(password: &SecretString) -> Self {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        Self {
            hash: crypto::hash_password(password.expose_secret(), &salt),
            salt,
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        crypto::hash_password(candidate, &self.salt) == self.hash
    }
}

pub struct WalletSession {
    // Teardown order matters: the runtime stops before the lock drops.
    runtime: Option<Runtime>,
    engine_handle: Option<JoinHandle<()>>,
    dispatcher_handle: Option<JoinHandle<()>>,
    requests: mpsc::UnboundedSender<EngineRequest>,
    listeners: ListenerSlot,
    password: RwLock<PasswordProbe>,
    validator: InputValidator,
    paths: WalletPaths,
    minimum_fee: u64,
    _lock: StoreLock,
}

impl std::fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSession")
            .field("paths", &self.paths)
            .field("minimum_fee", &self.minimum_fee)
            .finish_non_exhaustive()
    }
}

impl WalletSession {
    /// Create a new wallet store and open a session on it.
    ///
    /// `is_restore` additionally brings up the embedded node supervisor
    /// so the freshly restored wallet can resync from scratch.
    pub fn create(
        root_dir: impl AsRef<Path>,
        passphrase: &SecretString,
        mnemonic: &str,
        is_restore: bool,
    ) -> WalletResult<Self> {
        let paths = WalletPaths::new(root_dir)?;
        paths.ensure_directories()?;

        InputValidator::default().validate_password(passphrase.expose_secret())?;

        let store = WalletStore::new(paths.store_file());
        if store.exists() {
            return Err(WalletError::AlreadyExists(
                store.store_path().display().to_string(),
            ));
        }

        let seed = crypto::seed_from_mnemonic(mnemonic)?;
        let lock = StoreLock::acquire(paths.lock_file())?;

        let payload = StorePayload::new(StoreSecrets {
            mnemonic_phrase: Some(mnemonic.to_string()),
            seed_bytes: seed.to_vec(),
        });
        let mut data = WalletData::from_payload(payload)?;

        // Every new wallet starts with one receive address.
        let mut address = data.generate_address(chrono::Utc::now().timestamp())?;
        address.label = "default".to_string();
        data.save_address(address, true);

        let unlocked = store.create(passphrase, &data.to_payload())?;
        log::info!("wallet store created at {}", store.store_path().display());

        Self::boot(paths, lock, unlocked, data, passphrase, is_restore)
    }

    /// Open an existing wallet store.
    pub fn open(root_dir: impl AsRef<Path>, passphrase: &SecretString) -> WalletResult<Self> {
        let paths = WalletPaths::new(root_dir)?;

        let store = WalletStore::new(paths.store_file());
        if !store.exists() {
            return Err(WalletError::NotFound(
                store.store_path().display().to_string(),
            ));
        }

        let lock = StoreLock::acquire(paths.lock_file())?;
        let (unlocked, payload) = store.open(passphrase)?;
        let data = WalletData::from_payload(payload)?;
        log::info!("wallet store opened at {}", store.store_path().display());

        Self::boot(paths, lock, unlocked, data, passphrase, false)
    }

    /// Synchronous probe: does a wallet store exist under this root?
    pub fn is_initialized(root_dir: impl AsRef<Path>) -> bool {
        WalletPaths::new(root_dir)
            .map(|paths| paths.store_file().exists())
            .unwrap_or(false)
    }

    fn boot(
        paths: WalletPaths,
        lock: StoreLock,
        unlocked: UnlockedStore,
        data: WalletData,
        passphrase: &SecretString,
        is_restore: bool,
    ) -> WalletResult<Self> {
        let config_store = ConfigStore::from_paths(&paths);
        let config = config_store.load_or_default()?;
        let minimum_fee = config.fees.minimum_fee;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("mica-wallet-engine")
            .enable_all()
            .build()
            .map_err(|e| WalletError::Unknown(format!("Runtime start failed: {}", e)))?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let listeners = ListenerSlot::new();
        let dispatcher_slot = listeners.clone();
        let dispatcher_handle = runtime.spawn(async move {
            while let Some(event) = event_rx.recv().await {
                dispatcher_slot.deliver(event);
            }
        });

        let embedded_node_dir = is_restore.then(|| paths.root_dir().join("node"));
        let engine = Engine::new(
            data,
            unlocked,
            config,
            config_store,
            event_tx,
            embedded_node_dir,
        );
        let engine_handle = runtime.spawn(engine.run(request_rx));

        Ok(Self {
            runtime: Some(runtime),
            engine_handle: Some(engine_handle),
            dispatcher_handle: Some(dispatcher_handle),
            requests: request_tx,
            listeners,
            password: RwLock::new(PasswordProbe::new(passphrase)),
            validator: InputValidator::default(),
            paths,
            minimum_fee,
            _lock: lock,
        })
    }

    /// Register the session's listener, replacing any previous one.
    pub fn set_listener(&self, listener: Arc<dyn WalletListener>) {
        self.listeners.set(listener);
    }

    pub fn clear_listener(&self) {
        self.listeners.clear();
    }

    pub fn paths(&self) -> &WalletPaths {
        &self.paths
    }

    // ── Synchronous probes ──────────────────────────────────────────────

    /// Compare a candidate against the session passphrase. Pure local
    /// computation, no store access, no event.
    pub fn check_wallet_password(&self, candidate: &str) -> bool {
        self.password.read().matches(candidate)
    }

    /// Pure syntactic/checksum validation of an address candidate.
    pub fn is_address_well_formed(candidate: &str) -> bool {
        is_address_well_formed(candidate)
    }

    /// Verify a payment proof blob. Pure and side-effect free.
    pub fn verify_payment_proof(blob: &str) -> WalletResult<PaymentInfo> {
        crypto::verify_payment_proof(blob)
    }

    /// Generate a fresh BIP-39 mnemonic for wallet creation.
    pub fn create_mnemonic() -> WalletResult<String> {
        crypto::create_mnemonic()
    }

    // ── Asynchronous requests ───────────────────────────────────────────

    pub fn request_status(&self) {
        self.dispatch(EngineRequest::GetWalletStatus);
    }

    pub fn request_utxo_list(&self) {
        self.dispatch(EngineRequest::GetUtxos);
    }

    pub fn request_address_list(&self, own: bool) {
        self.dispatch(EngineRequest::GetAddresses { own });
    }

    pub fn request_transaction_list(&self) {
        self.dispatch(EngineRequest::GetTransactions);
    }

    /// Validate and enqueue a money transfer.
    ///
    /// Rejected calls never reach the engine: no connectivity, balance,
    /// or transaction event is emitted for them.
    pub fn send_money(
        &self,
        sender: &str,
        receiver: &str,
        comment: &str,
        amount: u64,
        fee: u64,
    ) -> WalletResult<()> {
        if amount == 0 {
            return Err(WalletError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }
        if fee < self.minimum_fee {
            return Err(WalletError::InvalidAmount(format!(
                "Fee below the minimum of {} grains",
                self.minimum_fee
            )));
        }
        if !is_receiver_token(receiver) {
            return Err(WalletError::InvalidAddress(
                "Receiver address is malformed".to_string(),
            ));
        }
        self.validator.validate_comment(comment)?;

        self.try_dispatch(EngineRequest::SendMoney {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            comment: comment.to_string(),
            amount,
            fee,
        })
    }

    pub fn calculate_change(&self, amount: u64) {
        self.dispatch(EngineRequest::CalcChange { amount });
    }

    /// Advisory: a final Updated/Removed event for this transaction may
    /// still be delivered after the request returns.
    pub fn cancel_transaction(&self, id: TxId) {
        self.dispatch(EngineRequest::CancelTx { id });
    }

    pub fn delete_transaction(&self, id: TxId) {
        self.dispatch(EngineRequest::DeleteTx { id });
    }

    pub fn generate_new_address(&self) {
        self.dispatch(EngineRequest::GenerateNewAddress);
    }

    pub fn save_address(&self, address: WalletAddress, own: bool) -> WalletResult<()> {
        self.validator.validate_label(&address.label)?;
        self.validator.validate_label(&address.category)?;
        self.try_dispatch(EngineRequest::SaveAddress { address, own })
    }

    pub fn delete_address(&self, wallet_id: &str) {
        self.dispatch(EngineRequest::DeleteAddress {
            wallet_id: wallet_id.to_string(),
        });
    }

    pub fn update_address(
        &self,
        wallet_id: &str,
        label: &str,
        expiration: AddressExpiration,
    ) -> WalletResult<()> {
        self.validator.validate_label(label)?;
        self.try_dispatch(EngineRequest::UpdateAddress {
            wallet_id: wallet_id.to_string(),
            label: label.to_string(),
            expiration,
        })
    }

    /// Change the store passphrase. An empty password is rejected here
    /// and never reaches the engine.
    pub fn change_wallet_password(&self, new_password: &SecretString) -> WalletResult<()> {
        self.validator
            .validate_password(new_password.expose_secret())?;

        *self.password.write() = PasswordProbe::new(new_password);
        // SecretString is deliberately not Clone; hand the engine its own copy.
        let engine_copy = SecretString::from(new_password.expose_secret().to_string());
        self.try_dispatch(EngineRequest::ChangeWalletPassword {
            new_password: engine_copy,
        })
    }

    pub fn export_payment_proof(&self, tx_id: TxId) {
        self.dispatch(EngineRequest::ExportPaymentProof { tx_id });
    }

    pub fn import_recovery(&self, path: impl AsRef<Path>) {
        self.dispatch(EngineRequest::ImportRecovery {
            path: path.as_ref().to_path_buf(),
        });
    }

    pub fn import_wallet_data(&self, json: &str) {
        self.dispatch(EngineRequest::ImportDataFromJson {
            json: json.to_string(),
        });
    }

    pub fn export_wallet_data(&self) {
        self.dispatch(EngineRequest::ExportDataToJson);
    }

    /// Takes effect on the next sync attempt.
    pub fn change_node_address(&self, address: &str) {
        self.dispatch(EngineRequest::ChangeNodeAddress {
            address: address.to_string(),
        });
    }

    pub fn sync_with_node(&self) {
        self.dispatch(EngineRequest::SyncWithNode);
    }

    pub fn rescan(&self) {
        self.dispatch(EngineRequest::Rescan);
    }

    pub fn get_notifications(&self) {
        self.dispatch(EngineRequest::GetNotifications);
    }

    pub fn mark_notification_as_read(&self, id: &str) {
        self.dispatch(EngineRequest::MarkNotificationAsRead { id: id.to_string() });
    }

    pub fn delete_notification(&self, id: &str) {
        self.dispatch(EngineRequest::DeleteNotification { id: id.to_string() });
    }

    pub fn switch_notifications(&self, kind: NotificationType, enabled: bool) {
        self.dispatch(EngineRequest::SwitchNotifications { kind, enabled });
    }

    pub fn get_exchange_rates(&self) {
        self.dispatch(EngineRequest::GetExchangeRates);
    }

    pub fn switch_exchange_rates(&self, enabled: bool) {
        self.dispatch(EngineRequest::SwitchExchangeRates { enabled });
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Stop the engine, flush the store, and release the store lock.
    /// The lock is released before this returns.
    pub fn close(mut self) -> WalletResult<()> {
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        let _ = self.requests.send(EngineRequest::Shutdown);

        if let Some(runtime) = self.runtime.take() {
            if let Some(handle) = self.engine_handle.take() {
                let _ = runtime.block_on(handle);
            }
            if let Some(handle) = self.dispatcher_handle.take() {
                let _ = runtime.block_on(handle);
            }
            drop(runtime);
        }
    }

    fn dispatch(&self, request: EngineRequest) {
        if self.requests.send(request).is_err() {
            log::warn!("request dropped: wallet session is closed");
        }
    }

    fn try_dispatch(&self, request: EngineRequest) -> WalletResult<()> {
        self.requests
            .send(request)
            .map_err(|_| WalletError::SessionClosed)
    }
}

impl Drop for WalletSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Accept either a display address or a raw hex identity token.
fn is_receiver_token(receiver: &str) -> bool {
    if is_address_well_formed(receiver) {
        return true;
    }
    receiver.len() == 64 && receiver.chars().all(|c| c.is_ascii_hexdigit())
}
