//! Engine-owned wallet state.
//!
//! `WalletData` is mutated exclusively by the engine worker; nothing
//! here is shared across the session boundary by reference. Every
//! method takes an explicit `now` so transitions stay deterministic
//! under test.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{self, IdentityKey};
use crate::dto::{
    ExchangeRate, Notification, NotificationPayload, NotificationState, NotificationType,
    SystemState, TxDescription, TxFailureReason, TxId, TxStatus, Utxo, UtxoKeyType, UtxoStatus,
    WalletAddress, WalletStatus,
};
use crate::errors::{WalletError, WalletResult};
use crate::storage::{StorePayload, StoreSecrets};

/// Default lifetime of a freshly generated address, in seconds.
pub const DEFAULT_ADDRESS_DURATION: i64 = 24 * 60 * 60;

/// Outcome of a send request, translated into events by the engine.
#[derive(Debug)]
pub enum SendOutcome {
    /// Receiver address is expired; nothing was created.
    ExpiredReceiver,
    /// Transaction created; `completed` is set for loopback sends that
    /// settle without the network.
    Accepted {
        tx: TxDescription,
        completed: bool,
    },
    /// Transaction created but immediately failed (insufficient funds).
    Failed { tx: TxDescription },
}

#[derive(Debug)]
pub struct WalletData {
    secrets: StoreSecrets,
    identity: IdentityKey,
    pub addresses: Vec<WalletAddress>,
    pub transactions: Vec<TxDescription>,
    pub utxos: Vec<Utxo>,
    pub notifications: Vec<Notification>,
    /// Node-fed quote cache; not persisted.
    pub rates: Vec<ExchangeRate>,
    pub chain: SystemState,
    pub sync_done: u64,
    pub sync_total: u64,
    next_utxo_id: u64,
    next_address_index: u64,
}

impl WalletData {
    pub fn from_payload(payload: StorePayload) -> WalletResult<Self> {
        let identity = IdentityKey::from_seed(&payload.secrets.seed_bytes)?;
        Ok(Self {
            identity,
            secrets: payload.secrets,
            addresses: payload.addresses,
            transactions: payload.transactions,
            utxos: payload.utxos,
            notifications: payload.notifications,
            rates: Vec::new(),
            chain: payload.chain,
            sync_done: 0,
            sync_total: 0,
            next_utxo_id: payload.next_utxo_id,
            next_address_index: payload.next_address_index,
        })
    }

    pub fn to_payload(&self) -> StorePayload {
        StorePayload {
            secrets: self.secrets.clone(),
            addresses: self.addresses.clone(),
            transactions: self.transactions.clone(),
            utxos: self.utxos.clone(),
            notifications: self
                .notifications
                .iter()
                .filter(|n| n.state != NotificationState::Deleted)
                .cloned()
                .collect(),
            chain: self.chain.clone(),
            next_utxo_id: self.next_utxo_id,
            next_address_index: self.next_address_index,
        }
    }

    pub fn identity(&self) -> &IdentityKey {
        &self.identity
    }

    /// Balance and sync summary snapshot.
    pub fn status(&self) -> WalletStatus {
        let mut available = 0u64;
        let mut receiving = 0u64;
        let mut sending = 0u64;
        let mut maturing = 0u64;

        for utxo in &self.utxos {
            match utxo.status {
                UtxoStatus::Available => available += utxo.amount,
                UtxoStatus::Incoming => receiving += utxo.amount,
                UtxoStatus::Outgoing => sending += utxo.amount,
                UtxoStatus::Maturing => maturing += utxo.amount,
                UtxoStatus::Unavailable | UtxoStatus::Spent => {}
            }
        }

        WalletStatus {
            available,
            receiving,
            sending,
            maturing,
            sync_done: self.sync_done,
            sync_total: self.sync_total,
            system: self.chain.clone(),
        }
    }

    // ── Addresses ───────────────────────────────────────────────────────

    pub fn generate_address(&mut self, now: i64) -> WalletResult<WalletAddress> {
        let key = crypto::derive_address_key(&self.secrets.seed_bytes, self.next_address_index)?;
        let public = key.verifying_key();

        let address = WalletAddress {
            wallet_id: hex::encode(public.to_bytes()),
            address: crypto::encode_address(&public)?,
            label: String::new(),
            category: String::new(),
            create_time: now,
            duration: DEFAULT_ADDRESS_DURATION,
            own: true,
        };

        self.next_address_index += 1;
        self.addresses.push(address.clone());
        Ok(address)
    }

    /// Insert or replace an address record.
    pub fn save_address(&mut self, mut address: WalletAddress, own: bool) {
        address.own = own;
        match self
            .addresses
            .iter_mut()
            .find(|a| a.wallet_id == address.wallet_id)
        {
            Some(existing) => *existing = address,
            None => self.addresses.push(address),
        }
    }

    pub fn delete_address(&mut self, wallet_id: &str) -> bool {
        let before = self.addresses.len();
        self.addresses.retain(|a| a.wallet_id != wallet_id);
        self.addresses.len() != before
    }

    pub fn update_address(
        &mut self,
        wallet_id: &str,
        label: String,
        expiration: crate::dto::AddressExpiration,
        now: i64,
    ) -> bool {
        use crate::dto::AddressExpiration;

        let Some(address) = self
            .addresses
            .iter_mut()
            .find(|a| a.wallet_id == wallet_id)
        else {
            return false;
        };

        address.label = label;
        match expiration {
            AddressExpiration::Expired => {
                // Expire immediately relative to the creation time.
                address.duration = (now - address.create_time).max(1);
            }
            AddressExpiration::OneDay | AddressExpiration::Auto => {
                address.duration = (now - address.create_time) + DEFAULT_ADDRESS_DURATION;
            }
            AddressExpiration::Never => address.duration = 0,
            AddressExpiration::AsIs => {}
        }
        true
    }

    pub fn addresses_for(&self, own: bool) -> Vec<WalletAddress> {
        self.addresses
            .iter()
            .filter(|a| a.own == own)
            .cloned()
            .collect()
    }

    fn find_address(&self, token: &str) -> Option<&WalletAddress> {
        self.addresses
            .iter()
            .find(|a| a.wallet_id == token || a.address == token)
    }

    // ── Coins ───────────────────────────────────────────────────────────

    /// Add a coin to the wallet, e.g. from recovery import.
    pub fn receive_coin(
        &mut self,
        amount: u64,
        maturity: u64,
        key_type: UtxoKeyType,
        create_tx_id: Option<TxId>,
    ) -> &Utxo {
        let id = self.next_utxo_id;
        self.next_utxo_id += 1;

        let status = if maturity > self.chain.height {
            UtxoStatus::Maturing
        } else {
            UtxoStatus::Available
        };

        self.utxos.push(Utxo {
            id,
            string_id: format!("{:016x}", id),
            amount,
            status,
            maturity,
            key_type,
            confirm_height: self.chain.height,
            create_tx_id,
            spent_tx_id: None,
        });
        self.utxos.last().expect("utxo just pushed")
    }

    /// Greedy smallest-first selection over spendable coins.
    fn select_coins(&self, target: u64) -> Option<Vec<u64>> {
        let mut candidates: Vec<&Utxo> = self
            .utxos
            .iter()
            .filter(|u| u.status == UtxoStatus::Available)
            .collect();
        candidates.sort_by_key(|u| u.amount);

        let mut selected = Vec::new();
        let mut total = 0u64;
        for utxo in candidates {
            selected.push(utxo.id);
            total += utxo.amount;
            if total >= target {
                return Some(selected);
            }
        }
        None
    }

    /// Change returned by a hypothetical send of `amount` (fee excluded),
    /// zero when the selector cannot cover it.
    pub fn calc_change(&self, amount: u64) -> u64 {
        match self.select_coins(amount) {
            Some(ids) => {
                let total: u64 = self
                    .utxos
                    .iter()
                    .filter(|u| ids.contains(&u.id))
                    .map(|u| u.amount)
                    .sum();
                total - amount
            }
            None => 0,
        }
    }

    /// Mature any coins whose maturity height has been reached. Returns
    /// true when at least one coin changed status.
    pub fn mature_coins(&mut self) -> bool {
        let height = self.chain.height;
        let mut changed = false;
        for utxo in &mut self.utxos {
            if utxo.status == UtxoStatus::Maturing && utxo.maturity <= height {
                utxo.status = UtxoStatus::Available;
                changed = true;
            }
        }
        changed
    }

    // ── Transactions ────────────────────────────────────────────────────

    pub fn send_money(
        &mut self,
        sender: &str,
        receiver: &str,
        comment: &str,
        amount: u64,
        fee: u64,
        now: i64,
    ) -> SendOutcome {
        if let Some(address) = self.find_address(receiver) {
            if address.is_expired(now) {
                return SendOutcome::ExpiredReceiver;
            }
        }

        let tx_id = Uuid::new_v4().simple().to_string();
        let my_id = if sender.is_empty() {
            self.identity.wallet_id()
        } else {
            sender.to_string()
        };

        let mut tx = TxDescription {
            id: tx_id.clone(),
            amount,
            fee,
            change: 0,
            min_height: self.chain.height,
            peer_id: receiver.to_string(),
            my_id,
            message: comment.to_string(),
            create_time: now,
            modify_time: now,
            sender: true,
            status: TxStatus::Pending,
            failure_reason: None,
        };

        let Some(selected) = self.select_coins(amount + fee) else {
            tx.status = TxStatus::Failed;
            tx.failure_reason = Some(TxFailureReason::NoInputs);
            self.transactions.push(tx.clone());
            return SendOutcome::Failed { tx };
        };

        let total: u64 = self
            .utxos
            .iter()
            .filter(|u| selected.contains(&u.id))
            .map(|u| u.amount)
            .sum();
        let change = total - amount - fee;
        tx.change = change;

        for utxo in &mut self.utxos {
            if selected.contains(&utxo.id) {
                utxo.status = UtxoStatus::Outgoing;
                utxo.spent_tx_id = Some(tx_id.clone());
            }
        }
        if change > 0 {
            let height = self.chain.height;
            self.receive_coin(change, height, UtxoKeyType::Change, Some(tx_id.clone()));
            // Change stays pending until the transaction settles.
            if let Some(coin) = self.utxos.last_mut() {
                coin.status = UtxoStatus::Incoming;
            }
        }

        // A loopback send to one of our own addresses settles locally;
        // anything else waits for the network.
        let completed = self
            .find_address(receiver)
            .map(|a| a.own)
            .unwrap_or(false);

        self.transactions.push(tx.clone());
        SendOutcome::Accepted { tx, completed }
    }

    /// Settle an in-flight transaction and its coins.
    pub fn complete_transaction(&mut self, tx_id: &TxId, now: i64) -> Option<TxDescription> {
        let tx = self
            .transactions
            .iter_mut()
            .find(|t| &t.id == tx_id && !t.status.is_terminal())?;
        tx.status = TxStatus::Completed;
        tx.modify_time = now;
        let tx = tx.clone();

        let amount = tx.amount;
        let receiver_is_own = self
            .addresses
            .iter()
            .any(|a| a.own && (a.wallet_id == tx.peer_id || a.address == tx.peer_id));

        for utxo in &mut self.utxos {
            if utxo.spent_tx_id.as_ref() == Some(tx_id) && utxo.status == UtxoStatus::Outgoing {
                utxo.status = UtxoStatus::Spent;
            }
            if utxo.create_tx_id.as_ref() == Some(tx_id) && utxo.status == UtxoStatus::Incoming {
                utxo.status = UtxoStatus::Available;
            }
        }
        if receiver_is_own {
            let height = self.chain.height;
            self.receive_coin(amount, height, UtxoKeyType::Regular, Some(tx_id.clone()));
        }

        Some(tx)
    }

    /// Move an in-flight transaction to the registering state.
    pub fn register_transaction(&mut self, tx_id: &TxId, now: i64) -> Option<TxDescription> {
        let tx = self
            .transactions
            .iter_mut()
            .find(|t| &t.id == tx_id && !t.status.is_terminal())?;
        tx.status = TxStatus::Registering;
        tx.modify_time = now;
        Some(tx.clone())
    }

    /// Cancel a transaction. Idempotent: unknown or terminal ids are a
    /// no-op and return None.
    pub fn cancel_transaction(&mut self, tx_id: &TxId, now: i64) -> Option<TxDescription> {
        let tx = self
            .transactions
            .iter_mut()
            .find(|t| &t.id == tx_id && !t.status.is_terminal())?;
        tx.status = TxStatus::Cancelled;
        tx.modify_time = now;
        let tx = tx.clone();

        // Roll the coins back.
        self.utxos.retain(|u| {
            !(u.create_tx_id.as_ref() == Some(tx_id) && u.status == UtxoStatus::Incoming)
        });
        for utxo in &mut self.utxos {
            if utxo.spent_tx_id.as_ref() == Some(tx_id) && utxo.status == UtxoStatus::Outgoing {
                utxo.status = UtxoStatus::Available;
                utxo.spent_tx_id = None;
            }
        }

        Some(tx)
    }

    /// Delete a transaction record. Idempotent.
    pub fn delete_transaction(&mut self, tx_id: &TxId) -> Option<TxDescription> {
        let index = self.transactions.iter().position(|t| &t.id == tx_id)?;
        Some(self.transactions.remove(index))
    }

    pub fn find_transaction(&self, tx_id: &TxId) -> Option<&TxDescription> {
        self.transactions.iter().find(|t| &t.id == tx_id)
    }

    // ── Notifications ───────────────────────────────────────────────────

    pub fn push_notification(
        &mut self,
        notification_type: NotificationType,
        payload: NotificationPayload,
        now: i64,
    ) -> Notification {
        let notification = Notification {
            id: hex::encode(Uuid::new_v4().into_bytes()),
            notification_type,
            state: NotificationState::Unread,
            create_time: now,
            payload,
        };
        self.notifications.push(notification.clone());
        notification
    }

    pub fn mark_notification_read(&mut self, id: &str) -> Option<Notification> {
        let notification = self
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.state == NotificationState::Unread)?;
        notification.state = NotificationState::Read;
        Some(notification.clone())
    }

    pub fn delete_notification(&mut self, id: &str) -> Option<Notification> {
        let notification = self
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.state != NotificationState::Deleted)?;
        notification.state = NotificationState::Deleted;
        Some(notification.clone())
    }

    pub fn visible_notifications(&self) -> Vec<Notification> {
        self.notifications
            .iter()
            .filter(|n| n.state != NotificationState::Deleted)
            .cloned()
            .collect()
    }
}

/// Exchange format for wallet data import/export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDataExport {
    pub own_addresses: Vec<WalletAddress>,
    pub contacts: Vec<WalletAddress>,
    pub transactions: Vec<TxDescription>,
}

impl WalletDataExport {
    pub fn from_data(data: &WalletData) -> Self {
        Self {
            own_addresses: data.addresses_for(true),
            contacts: data.addresses_for(false),
            transactions: data.transactions.clone(),
        }
    }

    /// Merge exported records into the wallet. Imported records replace
    /// existing ones with the same id.
    pub fn merge_into(self, data: &mut WalletData) {
        for address in self.own_addresses {
            data.save_address(address, true);
        }
        for address in self.contacts {
            data.save_address(address, false);
        }
        for tx in self.transactions {
            match data.transactions.iter_mut().find(|t| t.id == tx.id) {
                Some(existing) => *existing = tx,
                None => data.transactions.push(tx),
            }
        }
    }
}

/// One spendable record inside a recovery file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryCoin {
    pub amount: u64,
    pub maturity: u64,
    pub key_type: UtxoKeyType,
}

/// Parse a recovery file (JSON array of coins).
pub fn parse_recovery(bytes: &[u8]) -> WalletResult<Vec<RecoveryCoin>> {
    serde_json::from_slice(bytes)
        .map_err(|e| WalletError::ValidationError(format!("Unreadable recovery data: {}", e)))
}
