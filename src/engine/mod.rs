//! Background wallet engine.
//!
//! One engine task owns all mutable wallet state. Requests arrive over
//! an unbounded channel and are processed strictly in order; results
//! and unsolicited changes leave through the event channel. Nothing in
//! here returns values to the caller directly; asynchronous failures
//! are events, never panics across the boundary.

pub mod data;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::config_store::{ConfigStore, WalletConfig};
use crate::crypto;
use crate::dto::{
    AddressExpiration, ChangeAction, NotificationPayload, NotificationType, TxId, TxStatus,
    WalletAddress,
};
use crate::events::WalletEvent;
use crate::node_client::{connection_error_kind, NodeClient};
use crate::storage::UnlockedStore;

use data::{SendOutcome, WalletData, WalletDataExport};

/// Progress is reported at most this often during recovery import.
const RECOVERY_PROGRESS_CHUNK: u64 = 16;

/// Engine-bound request, one variant per facade verb.
#[derive(Debug)]
pub enum EngineRequest {
    GetWalletStatus,
    GetUtxos,
    GetAddresses {
        own: bool,
    },
    GetTransactions,
    SendMoney {
        sender: String,
        receiver: String,
        comment: String,
        amount: u64,
        fee: u64,
    },
    CalcChange {
        amount: u64,
    },
    CancelTx {
        id: TxId,
    },
    DeleteTx {
        id: TxId,
    },
    GenerateNewAddress,
    SaveAddress {
        address: WalletAddress,
        own: bool,
    },
    DeleteAddress {
        wallet_id: String,
    },
    UpdateAddress {
        wallet_id: String,
        label: String,
        expiration: AddressExpiration,
    },
    ChangeWalletPassword {
        new_password: SecretString,
    },
    ExportPaymentProof {
        tx_id: TxId,
    },
    ImportRecovery {
        path: PathBuf,
    },
    ImportDataFromJson {
        json: String,
    },
    ExportDataToJson,
    ChangeNodeAddress {
        address: String,
    },
    SyncWithNode,
    Rescan,
    GetNotifications,
    MarkNotificationAsRead {
        id: String,
    },
    DeleteNotification {
        id: String,
    },
    SwitchNotifications {
        kind: NotificationType,
        enabled: bool,
    },
    GetExchangeRates,
    SwitchExchangeRates {
        enabled: bool,
    },
    Shutdown,
}

pub struct Engine {
    data: WalletData,
    store: UnlockedStore,
    config: WalletConfig,
    config_store: ConfigStore,
    events: UnboundedSender<WalletEvent>,
    /// Data directory for the supervised local node; set on the restore
    /// path, where this session resyncs against its own node.
    embedded_node_dir: Option<PathBuf>,
    embedded_node_running: bool,
}

impl Engine {
    pub fn new(
        data: WalletData,
        store: UnlockedStore,
        config: WalletConfig,
        config_store: ConfigStore,
        events: UnboundedSender<WalletEvent>,
        embedded_node_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            data,
            store,
            config,
            config_store,
            events,
            embedded_node_dir,
            embedded_node_running: false,
        }
    }

    /// Drive the request loop until shutdown.
    pub async fn run(mut self, mut requests: UnboundedReceiver<EngineRequest>) {
        if let Some(dir) = self.embedded_node_dir.clone() {
            match std::fs::create_dir_all(&dir) {
                Ok(()) => {
                    self.embedded_node_running = true;
                    self.emit(WalletEvent::NodeStarted);
                }
                Err(e) => {
                    log::error!("embedded node data dir {} unusable: {}", dir.display(), e);
                    self.emit(WalletEvent::NodeFailedToStart);
                }
            }
        }

        while let Some(request) = requests.recv().await {
            log::debug!("engine request: {:?}", request);
            match request {
                EngineRequest::Shutdown => break,
                other => self.handle(other).await,
            }
        }

        self.flush();
        if self.embedded_node_running {
            self.emit(WalletEvent::NodeStopped);
            self.emit(WalletEvent::NodeThreadFinished);
        }
        log::info!("wallet engine stopped");
    }

    async fn handle(&mut self, request: EngineRequest) {
        match request {
            EngineRequest::GetWalletStatus => {
                let status = self.data.status();
                self.emit(WalletEvent::Status(status));
            }
            EngineRequest::GetUtxos => {
                self.emit(WalletEvent::AllUtxoChanged {
                    items: self.data.utxos.clone(),
                });
            }
            EngineRequest::GetAddresses { own } => {
                self.emit(WalletEvent::Addresses {
                    own,
                    items: self.data.addresses_for(own),
                });
            }
            EngineRequest::GetTransactions => {
                self.emit(WalletEvent::TxStatus {
                    action: ChangeAction::Reset,
                    items: self.data.transactions.clone(),
                });
            }
            EngineRequest::SendMoney {
                sender,
                receiver,
                comment,
                amount,
                fee,
            } => {
                self.send_money(&sender, &receiver, &comment, amount, fee);
            }
            EngineRequest::CalcChange { amount } => {
                let change = self.data.calc_change(amount);
                self.emit(WalletEvent::ChangeCalculated { change });
            }
            EngineRequest::CancelTx { id } => {
                if let Some(tx) = self.data.cancel_transaction(&id, now()) {
                    self.emit(WalletEvent::TxStatus {
                        action: ChangeAction::Updated,
                        items: vec![tx],
                    });
                    self.emit_utxos_and_status();
                    self.flush();
                }
            }
            EngineRequest::DeleteTx { id } => {
                if let Some(tx) = self.data.delete_transaction(&id) {
                    self.emit(WalletEvent::TxStatus {
                        action: ChangeAction::Removed,
                        items: vec![tx],
                    });
                    self.flush();
                }
            }
            EngineRequest::GenerateNewAddress => match self.data.generate_address(now()) {
                Ok(address) => {
                    self.emit(WalletEvent::GeneratedNewAddress(address));
                    self.flush();
                }
                Err(e) => {
                    log::error!("address generation failed: {}", e);
                    self.emit(WalletEvent::NewAddressFailed);
                }
            },
            EngineRequest::SaveAddress { address, own } => {
                self.data.save_address(address, own);
                self.emit(WalletEvent::Addresses {
                    own,
                    items: self.data.addresses_for(own),
                });
                self.flush();
            }
            EngineRequest::DeleteAddress { wallet_id } => {
                let own = self
                    .data
                    .addresses_for(true)
                    .iter()
                    .any(|a| a.wallet_id == wallet_id);
                if self.data.delete_address(&wallet_id) {
                    self.emit(WalletEvent::Addresses {
                        own,
                        items: self.data.addresses_for(own),
                    });
                    self.flush();
                }
            }
            EngineRequest::UpdateAddress {
                wallet_id,
                label,
                expiration,
            } => {
                if self.data.update_address(&wallet_id, label, expiration, now()) {
                    let own = self
                        .data
                        .addresses_for(true)
                        .iter()
                        .any(|a| a.wallet_id == wallet_id);
                    self.emit(WalletEvent::Addresses {
                        own,
                        items: self.data.addresses_for(own),
                    });
                    if self.config.notifications.address_status_changed {
                        if let Some(address) = self
                            .data
                            .addresses_for(own)
                            .into_iter()
                            .find(|a| a.wallet_id == wallet_id)
                        {
                            let note = self.data.push_notification(
                                NotificationType::AddressStatusChanged,
                                NotificationPayload::Address(address),
                                now(),
                            );
                            self.emit(WalletEvent::NotificationChanged {
                                action: ChangeAction::Added,
                                items: vec![note],
                            });
                        }
                    }
                    self.flush();
                }
            }
            EngineRequest::ChangeWalletPassword { new_password } => {
                let payload = self.data.to_payload();
                match self.store.change_password(&new_password, &payload) {
                    Ok(()) => log::info!("wallet password changed"),
                    Err(e) => log::error!("password change failed: {}", e),
                }
            }
            EngineRequest::ExportPaymentProof { tx_id } => {
                self.export_payment_proof(&tx_id);
            }
            EngineRequest::ImportRecovery { path } => {
                self.import_recovery(&path).await;
            }
            EngineRequest::ImportDataFromJson { json } => {
                let success = match serde_json::from_str::<WalletDataExport>(&json) {
                    Ok(parsed) => {
                        parsed.merge_into(&mut self.data);
                        self.flush();
                        true
                    }
                    Err(e) => {
                        log::error!("wallet data import rejected: {}", e);
                        false
                    }
                };
                self.emit(WalletEvent::ImportDataResult { success });
            }
            EngineRequest::ExportDataToJson => {
                match serde_json::to_string(&WalletDataExport::from_data(&self.data)) {
                    Ok(json) => self.emit(WalletEvent::ExportDataResult { json }),
                    Err(e) => log::error!("wallet data export failed: {}", e),
                }
            }
            EngineRequest::ChangeNodeAddress { address } => {
                self.config.node.endpoint = address.clone();
                if let Err(e) = self.config_store.update(|config| {
                    config.node.endpoint = address;
                    Ok(())
                }) {
                    log::error!("failed to persist node address: {}", e);
                }
            }
            EngineRequest::SyncWithNode => {
                self.sync_with_node().await;
            }
            EngineRequest::Rescan => {
                self.rescan();
            }
            EngineRequest::GetNotifications => {
                self.emit(WalletEvent::NotificationChanged {
                    action: ChangeAction::Reset,
                    items: self.data.visible_notifications(),
                });
            }
            EngineRequest::MarkNotificationAsRead { id } => {
                if let Some(note) = self.data.mark_notification_read(&id) {
                    self.emit(WalletEvent::NotificationChanged {
                        action: ChangeAction::Updated,
                        items: vec![note],
                    });
                    self.flush();
                }
            }
            EngineRequest::DeleteNotification { id } => {
                if let Some(note) = self.data.delete_notification(&id) {
                    self.emit(WalletEvent::NotificationChanged {
                        action: ChangeAction::Removed,
                        items: vec![note],
                    });
                    self.flush();
                }
            }
            EngineRequest::SwitchNotifications { kind, enabled } => {
                let result = self.config_store.update(|config| {
                    match kind {
                        NotificationType::SoftwareUpdate => {
                            config.notifications.software_update = enabled
                        }
                        NotificationType::AddressStatusChanged => {
                            config.notifications.address_status_changed = enabled
                        }
                        NotificationType::TransactionCompleted => {
                            config.notifications.transaction_completed = enabled
                        }
                        NotificationType::TransactionFailed => {
                            config.notifications.transaction_failed = enabled
                        }
                    }
                    Ok(())
                });
                match result {
                    Ok(updated) => self.config = updated,
                    Err(e) => log::error!("failed to persist notification toggle: {}", e),
                }
            }
            EngineRequest::GetExchangeRates => {
                if self.config.notifications.exchange_rates {
                    self.emit(WalletEvent::ExchangeRates {
                        rates: self.data.rates.clone(),
                    });
                }
            }
            EngineRequest::SwitchExchangeRates { enabled } => {
                let result = self.config_store.update(|config| {
                    config.notifications.exchange_rates = enabled;
                    Ok(())
                });
                match result {
                    Ok(updated) => self.config = updated,
                    Err(e) => log::error!("failed to persist exchange-rate toggle: {}", e),
                }
            }
            EngineRequest::Shutdown => unreachable!("handled by the run loop"),
        }
    }

    fn send_money(&mut self, sender: &str, receiver: &str, comment: &str, amount: u64, fee: u64) {
        let timestamp = now();
        match self
            .data
            .send_money(sender, receiver, comment, amount, fee, timestamp)
        {
            SendOutcome::ExpiredReceiver => {
                log::warn!("send rejected: receiver address is expired");
                self.emit(WalletEvent::CannotSendToExpired);
            }
            SendOutcome::Failed { tx } => {
                self.emit(WalletEvent::TxStatus {
                    action: ChangeAction::Added,
                    items: vec![tx.clone()],
                });
                if self.config.notifications.transaction_failed {
                    let note = self.data.push_notification(
                        NotificationType::TransactionFailed,
                        NotificationPayload::Transaction(tx),
                        timestamp,
                    );
                    self.emit(WalletEvent::NotificationChanged {
                        action: ChangeAction::Added,
                        items: vec![note],
                    });
                }
                self.flush();
            }
            SendOutcome::Accepted { tx, completed } => {
                self.emit(WalletEvent::TxStatus {
                    action: ChangeAction::Added,
                    items: vec![tx.clone()],
                });

                let updated = if completed {
                    self.data.complete_transaction(&tx.id, timestamp)
                } else {
                    self.data.register_transaction(&tx.id, timestamp)
                };
                if let Some(updated) = updated {
                    let settled = updated.status == TxStatus::Completed;
                    self.emit(WalletEvent::TxStatus {
                        action: ChangeAction::Updated,
                        items: vec![updated.clone()],
                    });
                    if settled && self.config.notifications.transaction_completed {
                        let note = self.data.push_notification(
                            NotificationType::TransactionCompleted,
                            NotificationPayload::Transaction(updated),
                            timestamp,
                        );
                        self.emit(WalletEvent::NotificationChanged {
                            action: ChangeAction::Added,
                            items: vec![note],
                        });
                    }
                }

                self.emit_utxos_and_status();
                self.flush();
            }
        }
    }

    fn export_payment_proof(&mut self, tx_id: &TxId) {
        let Some(tx) = self.data.find_transaction(tx_id) else {
            log::warn!("payment proof requested for unknown transaction");
            return;
        };
        if tx.status != TxStatus::Completed {
            log::warn!("payment proof requires a completed transaction");
            return;
        }

        let kernel = crypto::kernel_id(&tx.id, &tx.my_id, &tx.peer_id, tx.amount, tx.fee);
        let raw = match crypto::create_payment_proof(
            self.data.identity(),
            &tx.id,
            &tx.peer_id,
            tx.amount,
            &kernel,
        ) {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("payment proof generation failed: {}", e);
                return;
            }
        };

        match crypto::verify_payment_proof(&raw) {
            Ok(proof) => self.emit(WalletEvent::PaymentProofExported {
                tx_id: tx_id.clone(),
                proof,
            }),
            Err(e) => log::error!("generated payment proof failed self-check: {}", e),
        }
    }

    async fn import_recovery(&mut self, path: &std::path::Path) {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("cannot read recovery file {}: {}", path.display(), e);
                return;
            }
        };
        let coins = match data::parse_recovery(&bytes) {
            Ok(coins) => coins,
            Err(e) => {
                log::error!("recovery import rejected: {}", e);
                return;
            }
        };

        let total = coins.len() as u64;
        self.emit(WalletEvent::ImportRecoveryProgress { done: 0, total });

        for (index, coin) in coins.into_iter().enumerate() {
            self.data
                .receive_coin(coin.amount, coin.maturity, coin.key_type, None);
            let done = index as u64 + 1;
            if done % RECOVERY_PROGRESS_CHUNK == 0 || done == total {
                self.emit(WalletEvent::ImportRecoveryProgress { done, total });
            }
        }

        self.emit_utxos_and_status();
        self.flush();
    }

    async fn sync_with_node(&mut self) {
        let client = match NodeClient::new(
            &self.config.node.endpoint,
            Duration::from_secs(self.config.node.connect_timeout_secs),
        ) {
            Ok(client) => client,
            Err(e) => {
                self.emit(WalletEvent::NodeConnectionFailed {
                    error: connection_error_kind(&e),
                });
                self.emit(WalletEvent::NodeConnectedChanged { connected: false });
                return;
            }
        };

        match client.get_tip().await {
            Ok(tip) => {
                self.emit(WalletEvent::NodeConnectedChanged { connected: true });

                let behind = tip.height.saturating_sub(self.data.chain.height);
                self.emit(WalletEvent::NodeSyncProgress {
                    done: behind,
                    total: behind,
                });

                // Wallet-level scan over the newly discovered range.
                let total = behind;
                let step = (total / 4).max(1);
                let mut done = 0;
                while done < total {
                    done = (done + step).min(total);
                    self.emit(WalletEvent::SyncProgress { done, total });
                }
                if total == 0 {
                    self.emit(WalletEvent::SyncProgress { done: 0, total: 0 });
                }

                self.data.chain = tip;
                self.data.sync_done = total;
                self.data.sync_total = total;
                if self.data.mature_coins() {
                    self.emit(WalletEvent::AllUtxoChanged {
                        items: self.data.utxos.clone(),
                    });
                }
                let status = self.data.status();
                self.emit(WalletEvent::Status(status));

                if self.config.notifications.exchange_rates {
                    if let Ok(rates) = client.get_exchange_rates().await {
                        self.data.rates = rates;
                        self.emit(WalletEvent::ExchangeRates {
                            rates: self.data.rates.clone(),
                        });
                    }
                }
                self.flush();
            }
            Err(e) => {
                log::warn!("node sync failed: {}", e);
                self.emit(WalletEvent::NodeConnectionFailed {
                    error: connection_error_kind(&e),
                });
                self.emit(WalletEvent::NodeConnectedChanged { connected: false });
            }
        }
    }

    /// Replay the wallet's own view from the current chain state.
    fn rescan(&mut self) {
        let total = self.data.chain.height;
        self.data.sync_done = 0;
        self.data.sync_total = total;
        self.emit(WalletEvent::SyncProgress { done: 0, total });

        let step = (total / 4).max(1);
        let mut done = 0;
        while done < total {
            done = (done + step).min(total);
            self.emit(WalletEvent::SyncProgress { done, total });
        }
        if total == 0 {
            self.emit(WalletEvent::SyncProgress { done: 0, total: 0 });
        }
        self.data.sync_done = total;

        self.emit(WalletEvent::AllUtxoChanged {
            items: self.data.utxos.clone(),
        });
        let status = self.data.status();
        self.emit(WalletEvent::Status(status));
    }

    fn emit_utxos_and_status(&self) {
        self.emit(WalletEvent::AllUtxoChanged {
            items: self.data.utxos.clone(),
        });
        self.emit(WalletEvent::Status(self.data.status()));
    }

    fn emit(&self, event: WalletEvent) {
        // The receiver only disappears during session teardown.
        let _ = self.events.send(event);
    }

    fn flush(&self) {
        if let Err(e) = self.store.flush(&self.data.to_payload()) {
            log::error!("store flush failed: {}", e);
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
