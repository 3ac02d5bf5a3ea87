//! End-to-end wallet flows through the request broker

use bapvault::broker::{BrokerHandle, BrokerState, ManualClock, RequestBroker, SeedChoice, TransferSettings, WalletService};
use bapvault::crypto::{Address, KdfParams, Signature, DEFAULT_DERIVATION_PATH};
use bapvault::keystore::{FileVaultStorage, KeyVault, KeyVaultOptions, MemoryVaultStorage, VaultStorage};
use bapvault::signer::Signable;
use bapvault::VaultError;
use chrono::{Duration, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use tokio::task::JoinHandle;

const PASSWORD: &str = "Sup3r$ecret!";
const RECIPIENT: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";

fn options(ttl_secs: i64) -> KeyVaultOptions {
    KeyVaultOptions {
        profile_id: "default".to_string(),
        kdf_params: KdfParams::argon2id(256, 1, 1),
        derivation_path: DEFAULT_DERIVATION_PATH.to_string(),
        session_ttl: Duration::seconds(ttl_secs),
        enable_mlock: false,
    }
}

struct Harness {
    broker: BrokerHandle,
    service: Arc<WalletService>,
    clock: Arc<ManualClock>,
    _task: JoinHandle<()>,
}

fn start(storage: Arc<dyn VaultStorage>, ttl_secs: i64) -> Harness {
    let vault = Arc::new(KeyVault::new(storage, options(ttl_secs)));
    let service = Arc::new(WalletService::new(
        vault,
        1,
        TransferSettings {
            default_token: "BAP".to_string(),
            fee_rate_ppm: 1000,
        },
    ));
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (broker, task) = RequestBroker::spawn(service.clone(), clock.clone(), 64);
    Harness {
        broker,
        service,
        clock,
        _task: task,
    }
}

fn secret(s: &str) -> SecretString {
    SecretString::new(s.to_string())
}

async fn created_and_unlocked(h: &Harness) -> Address {
    h.broker
        .create_wallet(secret(PASSWORD), SeedChoice::Generate { words: 12 })
        .await
        .unwrap();
    h.broker.unlock(secret(PASSWORD)).await.unwrap()
}

#[tokio::test]
async fn test_create_unlock_send() {
    let h = start(Arc::new(MemoryVaultStorage::new()), 900);

    let created = h
        .broker
        .create_wallet(secret(PASSWORD), SeedChoice::Generate { words: 12 })
        .await
        .unwrap();
    assert_eq!(created.mnemonic.expose().split_whitespace().count(), 12);

    let address = h.broker.unlock(secret(PASSWORD)).await.unwrap();
    assert_eq!(address, created.address);
    assert_eq!(h.broker.connect().await.unwrap(), address);

    let account = h.broker.get_account().await.unwrap();
    assert_eq!(account.address, address);
    assert!(account.public_key.starts_with("0x02") || account.public_key.starts_with("0x03"));

    let receipt = h
        .broker
        .send_transaction(RECIPIENT, "1.5", Some("BAP".to_string()))
        .await
        .unwrap();
    assert_eq!(receipt.nonce, 0);
    assert_eq!(receipt.tx_hash.len(), 66);
    assert!(receipt.raw_transaction.starts_with("0x"));
}

#[tokio::test]
async fn test_lock_then_locked() {
    let h = start(Arc::new(MemoryVaultStorage::new()), 900);
    created_and_unlocked(&h).await;

    h.broker.lock().await.unwrap();
    assert_eq!(h.broker.state(), BrokerState::Locked);

    let err = h.broker.sign_message("hello").await.unwrap_err();
    assert!(matches!(err, VaultError::Locked));
    assert!(err.requires_unlock());
    assert!(matches!(h.broker.connect().await, Err(VaultError::Locked)));
}

#[tokio::test]
async fn test_concurrent_sends_get_sequential_nonces() {
    let h = start(Arc::new(MemoryVaultStorage::new()), 900);
    created_and_unlocked(&h).await;

    let sends = (0..8).map(|i| {
        let broker = h.broker.clone();
        async move {
            broker
                .send_transaction(RECIPIENT, format!("{}", i + 1), None)
                .await
        }
    });
    // join_all polls in index order, so requests are queued in that order
    let receipts = futures::future::join_all(sends).await;

    let history = h.broker.transaction_history().await.unwrap();
    assert_eq!(history.len(), 8);
    for (i, (receipt, record)) in receipts.into_iter().zip(&history).enumerate() {
        let receipt = receipt.unwrap();
        assert_eq!(receipt.nonce, i as u64);
        assert_eq!(record.nonce, i as u64);
        assert_eq!(record.tx_hash, receipt.tx_hash);
        assert_eq!(record.amount, ((i as u128 + 1) * 100_000_000).to_string());
    }
}

#[tokio::test]
async fn test_fifo_order_is_arrival_order() {
    let h = start(Arc::new(MemoryVaultStorage::new()), 900);
    created_and_unlocked(&h).await;

    // Queue a lock behind a send; the send must complete first
    let send = h.broker.send_transaction(RECIPIENT, "1", None);
    let lock = h.broker.lock();
    let sign = h.broker.sign_message("after lock");
    let (send, lock, sign) = tokio::join!(send, lock, sign);

    assert!(send.is_ok());
    assert!(lock.is_ok());
    assert!(matches!(sign, Err(VaultError::Locked)));
}

#[tokio::test]
async fn test_message_signature_verifies() {
    let h = start(Arc::new(MemoryVaultStorage::new()), 900);
    let address = created_and_unlocked(&h).await;

    let sig = h.broker.sign_message("Login to example.org").await.unwrap();
    let sig = Signature::from_hex(&sig).unwrap();
    let engine = h.service.engine();

    assert!(engine.verify(&address, Signable::Message(b"Login to example.org"), &sig));
    assert!(!engine.verify(&address, Signable::Message(b"Login to example.net"), &sig));

    let mut bytes = sig.to_bytes();
    bytes[10] ^= 0x01;
    let mutated = Signature::from_bytes(&bytes).unwrap();
    assert!(!engine.verify(&address, Signable::Message(b"Login to example.org"), &mutated));
}

#[tokio::test]
async fn test_wrong_password_counts_attempts() {
    let h = start(Arc::new(MemoryVaultStorage::new()), 900);
    h.broker
        .create_wallet(secret(PASSWORD), SeedChoice::Generate { words: 12 })
        .await
        .unwrap();

    for _ in 0..2 {
        let err = h.broker.unlock(secret("Wr0ng$ecret!")).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidPassword));
    }
    assert_eq!(h.broker.status().await.unwrap().failed_attempts, 2);
    assert_eq!(h.broker.state(), BrokerState::Locked);

    h.broker.unlock(secret(PASSWORD)).await.unwrap();
    assert_eq!(h.broker.status().await.unwrap().failed_attempts, 0);
}

#[tokio::test]
async fn test_weak_password_rejected() {
    let h = start(Arc::new(MemoryVaultStorage::new()), 900);
    let err = h
        .broker
        .create_wallet(secret("password"), SeedChoice::Generate { words: 12 })
        .await
        .err()
        .unwrap();
    assert!(matches!(err, VaultError::WeakPassword(_)));
    assert!(!h.broker.status().await.unwrap().has_wallet);
}

#[tokio::test]
async fn test_change_password() {
    let h = start(Arc::new(MemoryVaultStorage::new()), 900);
    let address = created_and_unlocked(&h).await;

    h.broker
        .change_password(secret(PASSWORD), secret("An0ther-Secret"))
        .await
        .unwrap();
    h.broker.lock().await.unwrap();

    assert!(matches!(
        h.broker.unlock(secret(PASSWORD)).await,
        Err(VaultError::InvalidPassword)
    ));
    assert_eq!(h.broker.unlock(secret("An0ther-Secret")).await.unwrap(), address);
}

#[tokio::test]
async fn test_session_expiry() {
    let h = start(Arc::new(MemoryVaultStorage::new()), 60);
    created_and_unlocked(&h).await;

    h.clock.advance(Duration::seconds(59));
    assert!(h.broker.sign_message("still fine").await.is_ok());

    h.clock.advance(Duration::seconds(2));
    let err = h.broker.sign_message("too late").await.unwrap_err();
    assert!(matches!(err, VaultError::SessionExpired));
    assert!(err.requires_unlock());
    assert_eq!(h.broker.state(), BrokerState::Locked);

    // Reported once; afterwards simply locked
    assert!(matches!(h.broker.sign_message("again").await, Err(VaultError::Locked)));

    h.broker.unlock(secret(PASSWORD)).await.unwrap();
    assert!(h.broker.sign_message("fresh session").await.is_ok());
}

#[tokio::test]
async fn test_reset_wallet() {
    let h = start(Arc::new(MemoryVaultStorage::new()), 900);
    created_and_unlocked(&h).await;

    h.broker.reset_wallet().await.unwrap();
    assert_eq!(h.broker.state(), BrokerState::Locked);
    assert!(!h.broker.status().await.unwrap().has_wallet);
    assert!(matches!(
        h.broker.unlock(secret(PASSWORD)).await,
        Err(VaultError::WalletNotFound(_))
    ));
}

#[tokio::test]
async fn test_create_twice_rejected() {
    let h = start(Arc::new(MemoryVaultStorage::new()), 900);
    created_and_unlocked(&h).await;
    let err = h
        .broker
        .create_wallet(secret(PASSWORD), SeedChoice::Generate { words: 12 })
        .await
        .err()
        .unwrap();
    assert!(matches!(err, VaultError::WalletExists(_)));
}

#[tokio::test]
async fn test_history_and_nonce_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first_address = {
        let h = start(Arc::new(FileVaultStorage::new(dir.path()).unwrap()), 900);
        let address = created_and_unlocked(&h).await;
        h.broker.send_transaction(RECIPIENT, "1", None).await.unwrap();
        h.broker.send_transaction(RECIPIENT, "2", None).await.unwrap();
        h.broker.shutdown().await.unwrap();
        address
    };

    let h = start(Arc::new(FileVaultStorage::new(dir.path()).unwrap()), 900);
    assert_eq!(h.broker.state(), BrokerState::Locked);
    let status = h.broker.status().await.unwrap();
    assert!(status.has_wallet);
    assert_eq!(status.address, Some(first_address));

    assert_eq!(h.broker.unlock(secret(PASSWORD)).await.unwrap(), first_address);
    let receipt = h.broker.send_transaction(RECIPIENT, "3", None).await.unwrap();
    assert_eq!(receipt.nonce, 2);

    let history = h.broker.transaction_history().await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].amount, "300000000");
}
