use std::fs;
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::time::Duration;

use mica_wallet::{
    ChangeAction, TxStatus, WalletError, WalletEvent, WalletResult, WalletSession,
};
use secrecy::SecretString;
use tempfile::TempDir;

const EVENT_TIMEOUT: Duration = Duration::from_secs(20);

fn test_dir() -> TempDir {
    let _ = env_logger::builder().is_test(true).try_init();
    TempDir::new().expect("create temp dir")
}

fn password(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

fn subscribe(session: &WalletSession) -> Receiver<WalletEvent> {
    let (tx, rx) = channel();
    session.set_listener(Arc::new(move |event: WalletEvent| {
        let _ = tx.send(event);
    }));
    rx
}

/// Drain events until the matcher accepts one; panics on timeout.
fn wait_for<T>(
    rx: &Receiver<WalletEvent>,
    description: &str,
    mut matcher: impl FnMut(WalletEvent) -> Option<T>,
) -> T {
    let deadline = std::time::Instant::now() + EVENT_TIMEOUT;
    loop {
        let remaining = deadline
            .checked_duration_since(std::time::Instant::now())
            .unwrap_or_else(|| panic!("timed out waiting for {}", description));
        match rx.recv_timeout(remaining) {
            Ok(event) => {
                if let Some(value) = matcher(event) {
                    return value;
                }
            }
            Err(_) => panic!("timed out waiting for {}", description),
        }
    }
}

fn assert_no_event(rx: &Receiver<WalletEvent>, description: &str) {
    if let Ok(event) = rx.recv_timeout(Duration::from_millis(300)) {
        panic!("expected no event ({}), got {:?}", description, event);
    }
}

fn fund_wallet(session: &WalletSession, rx: &Receiver<WalletEvent>, dir: &TempDir, coins: &[u64]) {
    let entries: Vec<serde_json::Value> = coins
        .iter()
        .map(|amount| serde_json::json!({"amount": amount, "maturity": 0, "keyType": "Regular"}))
        .collect();
    let recovery_path = dir.path().join("recovery.json");
    fs::write(&recovery_path, serde_json::to_vec(&entries).unwrap()).unwrap();

    session.import_recovery(&recovery_path);
    let total = coins.len() as u64;
    wait_for(rx, "recovery completion", |event| match event {
        WalletEvent::ImportRecoveryProgress { done, total: t } if done == t && t == total => {
            Some(())
        }
        _ => None,
    });
}

#[test]
fn open_missing_store_then_create_and_probe_password() -> WalletResult<()> {
    let dir = test_dir();
    let store_dir = dir.path().join("wallet");

    let err = WalletSession::open(&store_dir, &password("p1")).expect_err("open must fail");
    assert!(matches!(err, WalletError::NotFound(_)));
    assert!(!WalletSession::is_initialized(&store_dir));

    let mnemonic = WalletSession::create_mnemonic()?;
    let session = WalletSession::create(&store_dir, &password("p1"), &mnemonic, false)?;

    assert!(WalletSession::is_initialized(&store_dir));
    assert!(session.check_wallet_password("p1"));
    assert!(!session.check_wallet_password("wrong"));

    // The store is exclusively owned while the session lives.
    let locked = WalletSession::open(&store_dir, &password("p1"));
    assert!(matches!(locked, Err(WalletError::StoreLocked(_))));

    session.close()?;

    // Creating over an existing store is a typed failure.
    let exists = WalletSession::create(&store_dir, &password("p2"), &mnemonic, false);
    assert!(matches!(exists, Err(WalletError::AlreadyExists(_))));

    // After close the lock is released and reopening works.
    let reopened = WalletSession::open(&store_dir, &password("p1"))?;
    reopened.close()?;
    Ok(())
}

#[test]
fn create_with_invalid_phrase_leaves_no_store() {
    let dir = test_dir();
    let store_dir = dir.path().join("wallet");

    let err = WalletSession::create(&store_dir, &password("p1"), "not a real phrase", false)
        .expect_err("invalid phrase must fail");
    assert!(matches!(err, WalletError::InvalidPhrase(_)));
    assert!(!WalletSession::is_initialized(&store_dir));

    // Nothing is locked after the failure.
    let mnemonic = WalletSession::create_mnemonic().unwrap();
    WalletSession::create(&store_dir, &password("p1"), &mnemonic, false)
        .expect("creation succeeds after failed attempt")
        .close()
        .unwrap();
}

#[test]
fn fresh_wallet_status_is_all_zero() -> WalletResult<()> {
    let dir = test_dir();
    let mnemonic = WalletSession::create_mnemonic()?;
    let session = WalletSession::create(dir.path().join("w"), &password("p1"), &mnemonic, false)?;
    let rx = subscribe(&session);

    session.request_status();
    let status = wait_for(&rx, "status event", |event| match event {
        WalletEvent::Status(status) => Some(status),
        _ => None,
    });

    assert_eq!(status.available, 0);
    assert_eq!(status.receiving, 0);
    assert_eq!(status.sending, 0);
    assert_eq!(status.maturing, 0);

    session.close()?;
    Ok(())
}

#[test]
fn own_address_list_contains_only_own_addresses() -> WalletResult<()> {
    let dir = test_dir();
    let mnemonic = WalletSession::create_mnemonic()?;
    let session = WalletSession::create(dir.path().join("w"), &password("p1"), &mnemonic, false)?;
    let rx = subscribe(&session);

    // Mix in a foreign contact.
    let contact = mica_wallet::WalletAddress {
        wallet_id: "cd".repeat(32),
        address: String::new(),
        label: "exchange".to_string(),
        category: String::new(),
        create_time: 0,
        duration: 0,
        own: false,
    };
    session.save_address(contact, false)?;
    wait_for(&rx, "contact list refresh", |event| match event {
        WalletEvent::Addresses { own: false, .. } => Some(()),
        _ => None,
    });

    session.generate_new_address();
    wait_for(&rx, "generated address", |event| match event {
        WalletEvent::GeneratedNewAddress(addr) => {
            assert!(addr.own);
            Some(())
        }
        _ => None,
    });

    session.request_address_list(true);
    let items = wait_for(&rx, "own address list", |event| match event {
        WalletEvent::Addresses { own: true, items } => Some(items),
        _ => None,
    });

    assert_eq!(items.len(), 2, "default plus generated address");
    assert!(items.iter().all(|a| a.own));

    session.close()?;
    Ok(())
}

#[test]
fn rejected_send_never_reaches_the_engine() -> WalletResult<()> {
    let dir = test_dir();
    let mnemonic = WalletSession::create_mnemonic()?;
    let session = WalletSession::create(dir.path().join("w"), &password("p1"), &mnemonic, false)?;
    let rx = subscribe(&session);

    let receiver = "ab".repeat(32);

    let err = session.send_money("", &receiver, "", 0, 100).unwrap_err();
    assert!(matches!(err, WalletError::InvalidAmount(_)));

    let err = session.send_money("", &receiver, "", 100, 1).unwrap_err();
    assert!(matches!(err, WalletError::InvalidAmount(_)));

    let err = session.send_money("", "garbage", "", 100, 100).unwrap_err();
    assert!(matches!(err, WalletError::InvalidAddress(_)));

    assert_no_event(&rx, "after rejected sends");

    session.close()?;
    Ok(())
}

#[test]
fn sending_to_expired_receiver_fires_dedicated_event() -> WalletResult<()> {
    let dir = test_dir();
    let mnemonic = WalletSession::create_mnemonic()?;
    let session = WalletSession::create(dir.path().join("w"), &password("p1"), &mnemonic, false)?;
    let rx = subscribe(&session);

    let expired = mica_wallet::WalletAddress {
        wallet_id: "ef".repeat(32),
        address: String::new(),
        label: "stale".to_string(),
        category: String::new(),
        create_time: 1,
        duration: 1,
        own: false,
    };
    let receiver = expired.wallet_id.clone();
    session.save_address(expired, false)?;
    wait_for(&rx, "contact saved", |event| match event {
        WalletEvent::Addresses { own: false, .. } => Some(()),
        _ => None,
    });

    session.send_money("", &receiver, "", 100, 100)?;
    wait_for(&rx, "cannot-send-to-expired", |event| match event {
        WalletEvent::CannotSendToExpired => Some(()),
        _ => None,
    });

    // No transaction was created for that request.
    session.request_transaction_list();
    let items = wait_for(&rx, "transaction list", |event| match event {
        WalletEvent::TxStatus {
            action: ChangeAction::Reset,
            items,
        } => Some(items),
        _ => None,
    });
    assert!(items.is_empty());

    session.close()?;
    Ok(())
}

#[test]
fn recovery_progress_is_monotonic_and_terminates() -> WalletResult<()> {
    let dir = test_dir();
    let mnemonic = WalletSession::create_mnemonic()?;
    let session = WalletSession::create(dir.path().join("w"), &password("p1"), &mnemonic, false)?;
    let rx = subscribe(&session);

    let coins: Vec<u64> = (1..=40).map(|i| i * 10).collect();
    let entries: Vec<serde_json::Value> = coins
        .iter()
        .map(|amount| serde_json::json!({"amount": amount, "maturity": 0, "keyType": "Regular"}))
        .collect();
    let recovery_path = dir.path().join("recovery.json");
    fs::write(&recovery_path, serde_json::to_vec(&entries).unwrap()).unwrap();

    session.import_recovery(&recovery_path);

    let mut last_done = 0u64;
    loop {
        let (done, total) = wait_for(&rx, "recovery progress", |event| match event {
            WalletEvent::ImportRecoveryProgress { done, total } => Some((done, total)),
            _ => None,
        });
        assert_eq!(total, 40, "total is fixed for the duration of one import");
        assert!(done >= last_done, "done must be non-decreasing");
        assert!(done <= total);
        last_done = done;
        if done == total {
            break;
        }
    }

    // The imported coins are reflected in the full UTXO snapshot.
    let items = wait_for(&rx, "utxo snapshot", |event| match event {
        WalletEvent::AllUtxoChanged { items } => Some(items),
        _ => None,
    });
    assert_eq!(items.len(), 40);

    session.close()?;
    Ok(())
}

#[test]
fn loopback_send_settles_and_payment_proof_round_trips() -> WalletResult<()> {
    let dir = test_dir();
    let mnemonic = WalletSession::create_mnemonic()?;
    let session = WalletSession::create(dir.path().join("w"), &password("p1"), &mnemonic, false)?;
    let rx = subscribe(&session);

    fund_wallet(&session, &rx, &dir, &[1_000]);

    session.request_address_list(true);
    let own = wait_for(&rx, "own addresses", |event| match event {
        WalletEvent::Addresses { own: true, items } => Some(items),
        _ => None,
    });
    let receiver = own[0].address.clone();

    session.send_money("", &receiver, "loopback", 400, 100)?;

    let added = wait_for(&rx, "transaction added", |event| match event {
        WalletEvent::TxStatus {
            action: ChangeAction::Added,
            items,
        } => Some(items.into_iter().next().unwrap()),
        _ => None,
    });
    assert_eq!(added.status, TxStatus::Pending);
    assert_eq!(added.amount, 400);
    assert_eq!(added.fee, 100);

    let updated = wait_for(&rx, "transaction completion", |event| match event {
        WalletEvent::TxStatus {
            action: ChangeAction::Updated,
            items,
        } => Some(items.into_iter().next().unwrap()),
        _ => None,
    });
    assert_eq!(updated.id, added.id);
    assert_eq!(updated.status, TxStatus::Completed);

    let status = wait_for(&rx, "post-send status", |event| match event {
        WalletEvent::Status(status) => Some(status),
        _ => None,
    });
    // 1000 funded, 400 sent back to ourselves, 100 fee burned.
    assert_eq!(status.available, 900);
    assert_eq!(status.sending, 0);

    session.export_payment_proof(added.id.clone());
    let (tx_id, proof) = wait_for(&rx, "payment proof", |event| match event {
        WalletEvent::PaymentProofExported { tx_id, proof } => Some((tx_id, proof)),
        _ => None,
    });
    assert_eq!(tx_id, added.id);
    assert!(proof.is_valid);
    assert_eq!(proof.amount, 400);

    // Round-trip law: verifying the exported blob yields the same binding.
    let verified = WalletSession::verify_payment_proof(&proof.raw_proof)?;
    assert!(verified.is_valid);
    assert_eq!(verified.sender_id, proof.sender_id);
    assert_eq!(verified.receiver_id, proof.receiver_id);
    assert_eq!(verified.amount, proof.amount);
    assert_eq!(verified.kernel_id, proof.kernel_id);

    session.close()?;
    Ok(())
}

#[test]
fn transaction_list_reset_carries_complete_set() -> WalletResult<()> {
    let dir = test_dir();
    let mnemonic = WalletSession::create_mnemonic()?;
    let session = WalletSession::create(dir.path().join("w"), &password("p1"), &mnemonic, false)?;
    let rx = subscribe(&session);

    fund_wallet(&session, &rx, &dir, &[500, 500]);

    let receiver = "ab".repeat(32);
    session.send_money("", &receiver, "first", 100, 100)?;
    session.send_money("", &receiver, "second", 100, 100)?;

    // Wait until both sends produced their Added events.
    let mut seen = 0;
    while seen < 2 {
        wait_for(&rx, "transaction added", |event| match event {
            WalletEvent::TxStatus {
                action: ChangeAction::Added,
                ..
            } => Some(()),
            _ => None,
        });
        seen += 1;
    }

    session.request_transaction_list();
    let items = wait_for(&rx, "transaction reset", |event| match event {
        WalletEvent::TxStatus {
            action: ChangeAction::Reset,
            items,
        } => Some(items),
        _ => None,
    });
    assert_eq!(items.len(), 2, "reset delivers the complete current set");

    session.close()?;
    Ok(())
}

#[test]
fn cancel_and_delete_are_idempotent() -> WalletResult<()> {
    let dir = test_dir();
    let mnemonic = WalletSession::create_mnemonic()?;
    let session = WalletSession::create(dir.path().join("w"), &password("p1"), &mnemonic, false)?;
    let rx = subscribe(&session);

    // Unknown ids are silent no-ops, not errors.
    session.cancel_transaction("missing".to_string());
    session.delete_transaction("missing".to_string());
    assert_no_event(&rx, "after no-op cancel/delete");

    fund_wallet(&session, &rx, &dir, &[1_000]);

    let receiver = "ab".repeat(32);
    session.send_money("", &receiver, "", 300, 100)?;
    let added = wait_for(&rx, "transaction added", |event| match event {
        WalletEvent::TxStatus {
            action: ChangeAction::Added,
            items,
        } => Some(items.into_iter().next().unwrap()),
        _ => None,
    });

    session.cancel_transaction(added.id.clone());
    let cancelled = wait_for(&rx, "cancellation", |event| match event {
        WalletEvent::TxStatus {
            action: ChangeAction::Updated,
            items,
        } => items
            .into_iter()
            .find(|tx| tx.status == TxStatus::Cancelled),
        _ => None,
    });
    assert_eq!(cancelled.id, added.id);

    session.delete_transaction(added.id.clone());
    wait_for(&rx, "deletion", |event| match event {
        WalletEvent::TxStatus {
            action: ChangeAction::Removed,
            items,
        } => Some(items.into_iter().next().unwrap()),
        _ => None,
    });

    session.close()?;
    Ok(())
}

#[test]
fn export_and_import_wallet_data() -> WalletResult<()> {
    let dir = test_dir();
    let mnemonic = WalletSession::create_mnemonic()?;
    let session = WalletSession::create(dir.path().join("w"), &password("p1"), &mnemonic, false)?;
    let rx = subscribe(&session);

    session.export_wallet_data();
    let json = wait_for(&rx, "data export", |event| match event {
        WalletEvent::ExportDataResult { json } => Some(json),
        _ => None,
    });
    assert!(json.contains("ownAddresses"));

    session.import_wallet_data(&json);
    let success = wait_for(&rx, "data import", |event| match event {
        WalletEvent::ImportDataResult { success } => Some(success),
        _ => None,
    });
    assert!(success);

    session.import_wallet_data("{broken json");
    let success = wait_for(&rx, "rejected import", |event| match event {
        WalletEvent::ImportDataResult { success } => Some(success),
        _ => None,
    });
    assert!(!success);

    session.close()?;
    Ok(())
}

#[test]
fn state_survives_close_and_reopen() -> WalletResult<()> {
    let dir = test_dir();
    let store_dir = dir.path().join("wallet");
    let mnemonic = WalletSession::create_mnemonic()?;

    {
        let session = WalletSession::create(&store_dir, &password("p1"), &mnemonic, false)?;
        let rx = subscribe(&session);
        fund_wallet(&session, &rx, &dir, &[750]);
        session.close()?;
    }

    let wrong = WalletSession::open(&store_dir, &password("nope"));
    assert!(matches!(wrong, Err(WalletError::WrongPassword)));

    let session = WalletSession::open(&store_dir, &password("p1"))?;
    let rx = subscribe(&session);

    session.request_status();
    let status = wait_for(&rx, "status after reopen", |event| match event {
        WalletEvent::Status(status) => Some(status),
        _ => None,
    });
    assert_eq!(status.available, 750);

    session.close()?;
    Ok(())
}

#[test]
fn changed_password_updates_probe_and_store() -> WalletResult<()> {
    let dir = test_dir();
    let store_dir = dir.path().join("wallet");
    let mnemonic = WalletSession::create_mnemonic()?;

    let session = WalletSession::create(&store_dir, &password("old pass"), &mnemonic, false)?;

    let err = session
        .change_wallet_password(&password(""))
        .expect_err("empty password must be rejected");
    assert!(matches!(err, WalletError::ValidationError(_)));

    session.change_wallet_password(&password("new pass"))?;
    assert!(session.check_wallet_password("new pass"));
    assert!(!session.check_wallet_password("old pass"));
    session.close()?;

    assert!(matches!(
        WalletSession::open(&store_dir, &password("old pass")),
        Err(WalletError::WrongPassword)
    ));
    WalletSession::open(&store_dir, &password("new pass"))?.close()?;
    Ok(())
}

#[test]
fn restore_session_supervises_embedded_node() -> WalletResult<()> {
    let dir = test_dir();
    let mnemonic = WalletSession::create_mnemonic()?;
    let session = WalletSession::create(dir.path().join("w"), &password("p1"), &mnemonic, true)?;
    let rx = subscribe(&session);

    session.request_status();
    wait_for(&rx, "status", |event| match event {
        WalletEvent::Status(_) => Some(()),
        _ => None,
    });

    // Closing the session shuts the supervised node down; both
    // lifecycle events are delivered before close returns.
    session.close()?;
    wait_for(&rx, "node stopped", |event| match event {
        WalletEvent::NodeStopped => Some(()),
        _ => None,
    });
    wait_for(&rx, "node thread finished", |event| match event {
        WalletEvent::NodeThreadFinished => Some(()),
        _ => None,
    });
    Ok(())
}

#[test]
fn unreachable_node_surfaces_connectivity_events() -> WalletResult<()> {
    let dir = test_dir();
    let mnemonic = WalletSession::create_mnemonic()?;
    let session = WalletSession::create(dir.path().join("w"), &password("p1"), &mnemonic, false)?;
    let rx = subscribe(&session);

    // Nothing listens on the discard port; the connection is refused.
    session.change_node_address("http://127.0.0.1:9");
    session.sync_with_node();

    wait_for(&rx, "connection failure", |event| match event {
        WalletEvent::NodeConnectionFailed { .. } => Some(()),
        _ => None,
    });
    let connected = wait_for(&rx, "connectivity flag", |event| match event {
        WalletEvent::NodeConnectedChanged { connected } => Some(connected),
        _ => None,
    });
    assert!(!connected);

    session.close()?;
    Ok(())
}

#[test]
fn address_probe_is_pure_and_silent() -> WalletResult<()> {
    let dir = test_dir();
    let mnemonic = WalletSession::create_mnemonic()?;
    let session = WalletSession::create(dir.path().join("w"), &password("p1"), &mnemonic, false)?;
    let rx = subscribe(&session);

    session.generate_new_address();
    let addr = wait_for(&rx, "generated address", |event| match event {
        WalletEvent::GeneratedNewAddress(addr) => Some(addr),
        _ => None,
    });

    for _ in 0..3 {
        assert!(WalletSession::is_address_well_formed(&addr.address));
        assert!(!WalletSession::is_address_well_formed("mica1nope"));
    }
    assert_no_event(&rx, "after address probes");

    session.close()?;
    Ok(())
}
